use super::{Dialect, placeholders};
use crate::naming;

/// PostgreSQL: functions are invoked as a table source, identifiers are lower snake case.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSqlDialect;

impl Dialect for PostgreSqlDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    /// Returns something like `SELECT * FROM get_orders(?,?,?)`.
    fn build_stored_procedure_query(&self, name: &str, param_count: usize) -> String {
        format!("SELECT * FROM {}({})", name, placeholders(param_count))
    }

    fn from_database_name(&self, name: &str) -> String {
        naming::snake_to_lower_camel(name)
    }

    fn to_database_name(&self, name: &str) -> String {
        naming::camel_to_lower_snake(name)
    }
}
