use super::{Clauses, SubqueryHandle, compile};
use crate::state::{Limit, QueryState};

/// A builder that compiles to a [`SubqueryHandle`] instead of executing.
///
/// It offers the clause methods of [`Clauses`] and a single terminal,
/// [`SubQuery::get`]. Writes are not available on a subquery:
///
/// ```compile_fail
/// let mut sq = myqb::SubQuery::new("");
/// sq.update("users", myqb::Data::new(), 1);
/// ```
///
/// and the executing builder has no way to produce a handle:
///
/// ```compile_fail
/// async fn f<C: myqb::Connector>(db: &mut myqb::Db<C>) {
///     let handle: myqb::SubqueryHandle = db.get_sub_query();
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubQuery {
    prefix: String,
    alias: Option<String>,
    state: QueryState,
}

impl SubQuery {
    /// A subquery whose tables get `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            alias: None,
            state: QueryState::default(),
        }
    }

    /// A subquery rendered as `(...) alias`, e.g. for joins.
    pub fn aliased(prefix: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            alias: Some(alias.into()),
            state: QueryState::default(),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Compile the SELECT and reset the accumulated clauses.
    pub fn get(&mut self, table: &str, limit: impl Into<Limit>, columns: &str) -> SubqueryHandle {
        let state = std::mem::take(&mut self.state);
        let (query, params) =
            compile::select(&state, &self.prefix, table, limit.into(), columns).into_parts();
        SubqueryHandle {
            query,
            params,
            alias: self.alias.clone(),
        }
    }
}

impl Clauses for SubQuery {
    fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}
