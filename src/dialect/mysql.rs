use super::{Dialect, placeholders};
use crate::naming;

/// MySQL: procedures are invoked with `CALL`, identifiers are lower snake case.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn build_stored_procedure_query(&self, name: &str, param_count: usize) -> String {
        format!("CALL {}({})", name, placeholders(param_count))
    }

    fn from_database_name(&self, name: &str) -> String {
        naming::snake_to_lower_camel(name)
    }

    fn to_database_name(&self, name: &str) -> String {
        naming::camel_to_lower_snake(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        assert_eq!(MySqlDialect.build_stored_procedure_query("archive_orders", 2), "CALL archive_orders(?,?)");
    }
}
