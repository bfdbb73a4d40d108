use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The four filterable facets of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DimensionFamily {
    LeadSource,
    Csr,
    SalesRep,
    Service,
}

impl DimensionFamily {
    pub const ALL: [DimensionFamily; 4] = [
        DimensionFamily::LeadSource,
        DimensionFamily::Csr,
        DimensionFamily::SalesRep,
        DimensionFamily::Service,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DimensionFamily::LeadSource => "lead-source",
            DimensionFamily::Csr => "csr",
            DimensionFamily::SalesRep => "sales-rep",
            DimensionFamily::Service => "service",
        }
    }

    /// Accepts the canonical name plus the plural/underscore spellings used
    /// by the REST resources (`lead-sources`, `sales_reps`, ...).
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "lead-source" | "lead-sources" | "source" | "sources" => Ok(DimensionFamily::LeadSource),
            "csr" | "csrs" => Ok(DimensionFamily::Csr),
            "sales-rep" | "sales-reps" | "rep" | "reps" => Ok(DimensionFamily::SalesRep),
            "service" | "services" => Ok(DimensionFamily::Service),
            _ => Err(Error::InvalidFamily(s.to_string())),
        }
    }

    /// `app_config` key under which the last selection for this family is
    /// persisted.
    pub fn selection_key(self) -> &'static str {
        match self {
            DimensionFamily::LeadSource => "dcl_lead_sources",
            DimensionFamily::Csr => "dcl_csrs",
            DimensionFamily::SalesRep => "dcl_sales_reps",
            DimensionFamily::Service => "dcl_services",
        }
    }
}

impl std::fmt::Display for DimensionFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable value of a dimension family, e.g. the "angi" lead source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionOption {
    pub id: String,
    pub display_name: String,
    pub color_hint: String,
}

impl DimensionOption {
    pub fn new(id: &str, display_name: &str, color_hint: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            color_hint: color_hint.to_string(),
        }
    }
}

/// Active catalog options for every family, in display order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalogs {
    pub lead_sources: Vec<DimensionOption>,
    pub csrs: Vec<DimensionOption>,
    pub sales_reps: Vec<DimensionOption>,
    pub services: Vec<DimensionOption>,
}

impl Catalogs {
    pub fn get(&self, family: DimensionFamily) -> &[DimensionOption] {
        match family {
            DimensionFamily::LeadSource => &self.lead_sources,
            DimensionFamily::Csr => &self.csrs,
            DimensionFamily::SalesRep => &self.sales_reps,
            DimensionFamily::Service => &self.services,
        }
    }

    pub fn set(&mut self, family: DimensionFamily, options: Vec<DimensionOption>) {
        match family {
            DimensionFamily::LeadSource => self.lead_sources = options,
            DimensionFamily::Csr => self.csrs = options,
            DimensionFamily::SalesRep => self.sales_reps = options,
            DimensionFamily::Service => self.services = options,
        }
    }
}
