use std::sync::Arc;
use crate::core::{Result, Value};
use crate::session::{Cursor, Record, Session};
use super::declaration::ReturnShape;
use super::generator::Implementation;

/// Outcome of a [`DynamicProxy::call`], following the procedure's return shape.
#[derive(Debug)]
pub enum CallResult<'c> {
    Done,
    Single(Option<Record>),
    List(Vec<Record>),
    Cursor(Cursor<'c, Record>),
}

impl CallResult<'_> {
    /// All rows as a list, draining a cursor if needed.
    pub fn into_records(self) -> Result<Vec<Record>> {
        match self {
            Self::Done => Ok(Vec::new()),
            Self::Single(record) => Ok(record.into_iter().collect()),
            Self::List(records) => Ok(records),
            Self::Cursor(mut cursor) => cursor.fetch_list(),
        }
    }
}

/// Calls procedures by name with untyped arguments; rows come back as [`Record`]s.
pub struct DynamicProxy<'s> {
    session: &'s mut Session,
    implementation: Arc<Implementation>,
}

impl<'s> DynamicProxy<'s> {
    pub(crate) fn new(implementation: Arc<Implementation>, session: &'s mut Session) -> Self {
        Self {
            session,
            implementation,
        }
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn session(&mut self) -> &mut Session {
        &mut *self.session
    }

    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<CallResult<'_>> {
        let procedure = self.implementation.procedure(name)?;
        match procedure.returns() {
            ReturnShape::Void => procedure.execute(self.session, args).map(|_| CallResult::Done),
            ReturnShape::Single(_) => procedure
                .shaped_cursor::<Record>(self.session, args)?
                .fetch_single_or_null()
                .map(CallResult::Single),
            ReturnShape::List(_) => procedure
                .shaped_cursor::<Record>(self.session, args)?
                .fetch_list()
                .map(CallResult::List),
            ReturnShape::Cursor(_) => procedure
                .shaped_cursor::<Record>(self.session, args)
                .map(CallResult::Cursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, DbError, EntityShape};
    use crate::dialect::PostgreSqlDialect;
    use crate::memory::MemoryDatabase;
    use crate::proxy::declaration::{InterfaceDecl, ParamDecl, ProcedureDecl};
    use crate::proxy::ProxyFactory;
    use crate::result::QueryResult;

    fn customers() -> EntityShape {
        EntityShape::record(
            "Customer",
            vec![Column::new("id", DataType::Integer), Column::new("fullName", DataType::Text)],
        )
    }

    fn decl() -> InterfaceDecl {
        InterfaceDecl::new("CustomerDirectory")
            .procedure(
                ProcedureDecl::new("findCustomers")
                    .param(ParamDecl::new("prefix", DataType::Text).preprocessor(crate::Preprocessor::LikePrefix))
                    .returns(ReturnShape::List(customers())),
            )
            .procedure(ProcedureDecl::new("streamCustomers").returns(ReturnShape::Cursor(customers())))
            .procedure(
                ProcedureDecl::new("getCustomer")
                    .param(ParamDecl::new("id", DataType::Integer))
                    .returns(ReturnShape::Single(customers())),
            )
            .procedure(ProcedureDecl::new("touch"))
            .procedure(
                ProcedureDecl::new("customersByFlags")
                    .param(ParamDecl::new("flags", DataType::IntegerArray).preprocessor(crate::Preprocessor::BitMask))
                    .returns(ReturnShape::List(customers())),
            )
    }

    fn database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let rows = || {
            QueryResult::with_columns(["id", "full_name"])
                .row([Value::Integer(1), Value::Text("Ada".into())])
                .row([Value::Integer(2), Value::Text("Alan".into())])
        };
        db.register_function("find_customers", move |_| Ok(rows()));
        db.register_function("stream_customers", move |_| Ok(rows()));
        db.register_function("get_customer", |_| Ok(QueryResult::with_columns(["id", "full_name"])));
        db.register_function("touch", |_| Ok(QueryResult::empty()));
        db.register_function("customers_by_flags", move |_| Ok(rows()));
        db
    }

    #[test]
    fn test_dynamic_calls() {
        let db = database();
        let mut session = Session::new(Box::new(db.connect()), Arc::new(PostgreSqlDialect));
        let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
        let mut proxy = factory.get_dynamic_proxy(&decl(), &mut session).unwrap();

        match proxy.call("findCustomers", vec![Value::Text("A_".into())]).unwrap() {
            CallResult::List(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].get("fullName"), Some(&Value::Text("Alan".into())));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(db.last_statement().unwrap().params, vec![Value::Text("a\\_%".into())]);

        let streamed = proxy.call("streamCustomers", vec![]).unwrap().into_records().unwrap();
        assert_eq!(streamed.len(), 2);

        assert!(matches!(
            proxy.call("getCustomer", vec![Value::Integer(3)]).unwrap(),
            CallResult::Single(None)
        ));
        assert!(matches!(proxy.call("touch", vec![]).unwrap(), CallResult::Done));
        assert_eq!(db.last_statement().unwrap().sql, "SELECT * FROM touch()");
    }

    #[test]
    fn test_dynamic_call_errors() {
        let db = database();
        let mut session = Session::new(Box::new(db.connect()), Arc::new(PostgreSqlDialect));
        let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
        let mut proxy = factory.get_dynamic_proxy(&decl(), &mut session).unwrap();

        assert!(matches!(proxy.call("missing", vec![]), Err(DbError::InvalidArgument(_))));
        assert!(matches!(proxy.call("getCustomer", vec![]), Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn test_dynamic_call_checks_argument_types() {
        let db = database();
        let mut session = Session::new(Box::new(db.connect()), Arc::new(PostgreSqlDialect));
        let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
        let mut proxy = factory.get_dynamic_proxy(&decl(), &mut session).unwrap();

        assert!(matches!(
            proxy.call("customersByFlags", vec![Value::Text("a_".into())]),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            proxy.call("findCustomers", vec![Value::Integer(3)]),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(db.statements().is_empty());

        let records = proxy
            .call("customersByFlags", vec![Value::Array(vec![Value::Integer(1), Value::Integer(4)])])
            .unwrap()
            .into_records()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(db.last_statement().unwrap().params, vec![Value::Integer(0b10010)]);
    }
}
