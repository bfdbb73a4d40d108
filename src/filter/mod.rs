use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::dimension::DimensionFamily;
use crate::query::range::DateRange;
use crate::rows::FactRow;

/// Which values of one dimension family participate in an aggregate.
///
/// An explicit empty set is a real state: it filters every row out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "mode", content = "ids", rename_all = "snake_case")]
pub enum Selection {
    /// Every value, including ids the catalog does not know about.
    #[default]
    All,
    /// Only these ids.
    Only(BTreeSet<String>),
}

impl Selection {
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Only(ids.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        Selection::Only(BTreeSet::new())
    }

    pub fn is_selected(&self, dimension_id: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(ids) => ids.contains(dimension_id),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    /// Treat an explicitly empty selection as `All`.
    ///
    /// Only the average-contract-value KPI uses this; everywhere else an
    /// empty selection must stay empty.
    pub fn or_all_if_empty(&self) -> Cow<'_, Selection> {
        match self {
            Selection::Only(ids) if ids.is_empty() => Cow::Owned(Selection::All),
            other => Cow::Borrowed(other),
        }
    }

    /// Persisted form: `None` for `All`, otherwise the id list.
    pub fn to_persisted(&self) -> Option<Vec<String>> {
        match self {
            Selection::All => None,
            Selection::Only(ids) => Some(ids.iter().cloned().collect()),
        }
    }

    pub fn from_persisted(ids: Option<Vec<String>>) -> Self {
        match ids {
            None => Selection::All,
            Some(ids) => Selection::only(ids),
        }
    }
}

/// Free-function form of [`Selection::is_selected`].
pub fn is_selected(dimension_id: &str, selection: &Selection) -> bool {
    selection.is_selected(dimension_id)
}

/// The user's current selection for every dimension family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SelectionState {
    pub lead_sources: Selection,
    pub csrs: Selection,
    pub sales_reps: Selection,
    pub services: Selection,
}

impl SelectionState {
    pub fn get(&self, family: DimensionFamily) -> &Selection {
        match family {
            DimensionFamily::LeadSource => &self.lead_sources,
            DimensionFamily::Csr => &self.csrs,
            DimensionFamily::SalesRep => &self.sales_reps,
            DimensionFamily::Service => &self.services,
        }
    }

    pub fn set(&mut self, family: DimensionFamily, selection: Selection) {
        match family {
            DimensionFamily::LeadSource => self.lead_sources = selection,
            DimensionFamily::Csr => self.csrs = selection,
            DimensionFamily::SalesRep => self.sales_reps = selection,
            DimensionFamily::Service => self.services = selection,
        }
    }

    pub fn with(mut self, family: DimensionFamily, selection: Selection) -> Self {
        self.set(family, selection);
        self
    }
}

/// Rows inside `range` whose dimension is selected.
///
/// The date test runs first, then the selection test.
pub fn select_rows<'a, R: FactRow>(
    rows: &'a [R],
    range: &'a DateRange,
    selection: &'a Selection,
) -> impl Iterator<Item = &'a R> + 'a {
    rows.iter()
        .filter(move |r| range.contains(r.date()))
        .filter(move |r| selection.is_selected(r.dimension_id()))
}
