//! Turns an [`InterfaceDecl`] into an [`Implementation`]: one dispatch entry per
//! procedure holding its SQL text, its resolved pre-processors and its return
//! shape. Every declaration problem surfaces here as a `GenerationError`.

use std::collections::{HashMap, HashSet};
use tracing::{Level, event, info_span};
use uuid::Uuid;
use crate::core::{DbError, EntityShape, Result, ShapeKind, Value};
use crate::dialect::Dialect;
use crate::naming;
use crate::preprocessor::Preprocessor;
use crate::session::{Cursor, Entity, FromRow, Session};
use super::declaration::{InterfaceDecl, ProcedureDecl, ReturnShape};

/// The compiled call surface of one interface.
#[derive(Debug)]
pub struct Implementation {
    id: Uuid,
    declaration: InterfaceDecl,
    dialect: &'static str,
    procedures: Vec<CompiledProcedure>,
    by_name: HashMap<String, usize>,
}

impl Implementation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn interface_name(&self) -> &str {
        &self.declaration.name
    }

    pub fn declaration(&self) -> &InterfaceDecl {
        &self.declaration
    }

    pub fn dialect_name(&self) -> &'static str {
        self.dialect
    }

    pub fn procedures(&self) -> &[CompiledProcedure] {
        &self.procedures
    }

    /// Entry for the procedure declared at `index`.
    pub fn procedure_at(&self, index: usize) -> Result<&CompiledProcedure> {
        self.procedures.get(index).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "{} declares {} procedure(s), no procedure #{}",
                self.declaration.name,
                self.procedures.len(),
                index
            ))
        })
    }

    pub fn procedure(&self, name: &str) -> Result<&CompiledProcedure> {
        self.by_name
            .get(name)
            .map(|&idx| &self.procedures[idx])
            .ok_or_else(|| {
                DbError::InvalidArgument(format!(
                    "{} has no procedure '{}'",
                    self.declaration.name, name
                ))
            })
    }
}

/// One procedure ready to be called.
#[derive(Debug, Clone)]
pub struct CompiledProcedure {
    decl: ProcedureDecl,
    sql: String,
    preprocessors: Vec<Option<Preprocessor>>,
}

impl CompiledProcedure {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn declaration(&self) -> &ProcedureDecl {
        &self.decl
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn returns(&self) -> &ReturnShape {
        &self.decl.returns
    }

    pub fn param_count(&self) -> usize {
        self.decl.params.len()
    }

    /// Checks each argument against its declared type, then applies the pre-processors.
    pub fn bind(&self, args: Vec<Value>) -> Result<Vec<Value>> {
        if args.len() != self.preprocessors.len() {
            return Err(DbError::InvalidArgument(format!(
                "{} expects {} argument(s), got {}",
                self.decl.name,
                self.preprocessors.len(),
                args.len()
            )));
        }

        if let Some((param, arg)) = self
            .decl
            .params
            .iter()
            .zip(&args)
            .find(|(param, arg)| !param.data_type.is_compatible(arg))
        {
            return Err(DbError::InvalidArgument(format!(
                "argument '{}' of {} expects {}, got {}",
                param.name,
                self.decl.name,
                param.data_type,
                arg.type_name()
            )));
        }

        Ok(args
            .into_iter()
            .zip(&self.preprocessors)
            .map(|(arg, preprocessor)| match preprocessor {
                Some(p) => p.apply(arg),
                None => arg,
            })
            .collect())
    }

    fn expect(&self, returns_wanted: bool, wanted: &str) -> Result<()> {
        if !returns_wanted {
            return Err(DbError::InvalidArgument(format!(
                "{} returns {}, not {}",
                self.decl.name,
                self.decl.returns.kind(),
                wanted
            )));
        }
        Ok(())
    }

    fn trace(&self, args: &[Value]) {
        event!(
            Level::DEBUG,
            procedure = %self.decl.name,
            sql = %self.sql,
            params = args.len(),
            "procedure call"
        );
    }

    pub fn execute(&self, session: &mut Session, args: Vec<Value>) -> Result<()> {
        self.expect(matches!(self.decl.returns, ReturnShape::Void), "void")?;
        let bound = self.bind(args)?;
        self.trace(&bound);
        session.execute(&self.sql, &bound).map(|_| ())
    }

    pub fn single<T: Entity>(&self, session: &mut Session, args: Vec<Value>) -> Result<Option<T>> {
        self.expect(matches!(self.decl.returns, ReturnShape::Single(_)), "single")?;
        let bound = self.bind(args)?;
        self.trace(&bound);
        session.get_single_or_null::<T>(&self.sql, &bound)
    }

    pub fn list<T: Entity>(&self, session: &mut Session, args: Vec<Value>) -> Result<Vec<T>> {
        self.expect(matches!(self.decl.returns, ReturnShape::List(_)), "list")?;
        let bound = self.bind(args)?;
        self.trace(&bound);
        session.get_list::<T>(&self.sql, &bound)
    }

    pub fn cursor<'s, T: Entity>(
        &self,
        session: &'s mut Session,
        args: Vec<Value>,
    ) -> Result<Cursor<'s, T>> {
        self.expect(matches!(self.decl.returns, ReturnShape::Cursor(_)), "cursor")?;
        let bound = self.bind(args)?;
        self.trace(&bound);
        session.get_cursor::<T>(&self.sql, &bound)
    }

    /// Same as [`cursor`](Self::cursor) for any return shape, mapping through the declared entity.
    pub fn shaped_cursor<'s, T: FromRow>(
        &self,
        session: &'s mut Session,
        args: Vec<Value>,
    ) -> Result<Cursor<'s, T>> {
        let shape = self.decl.returns.entity().ok_or_else(|| {
            DbError::InvalidArgument(format!("{} does not return rows", self.decl.name))
        })?;
        let bound = self.bind(args)?;
        self.trace(&bound);
        let fetch_size = session.default_fetch_size();
        session.get_cursor_for_shape::<T>(&self.sql, shape, fetch_size, &bound)
    }
}

fn generation_error(interface: &str, message: String) -> DbError {
    DbError::GenerationError(format!("{}: {}", interface, message))
}

/// Validates `decl` and compiles it against `dialect`.
pub fn generate(decl: &InterfaceDecl, dialect: &dyn Dialect) -> Result<Implementation> {
    let span = info_span!(
        "proxy.generate",
        interface = %decl.name,
        dialect = dialect.name(),
        procedures = decl.procedures.len()
    );
    let _enter = span.enter();

    if decl.name.trim().is_empty() {
        return Err(DbError::GenerationError("interface name cannot be empty".into()));
    }

    let mut procedures = Vec::with_capacity(decl.procedures.len());
    let mut by_name = HashMap::new();
    let mut database_names = HashSet::new();

    for (idx, procedure) in decl.procedures.iter().enumerate() {
        let compiled = compile_procedure(&decl.name, procedure, dialect)?;

        if by_name.insert(procedure.name.clone(), idx).is_some() {
            return Err(generation_error(
                &decl.name,
                format!("procedure '{}' is declared twice", procedure.name),
            ));
        }
        let database_name = dialect.to_database_name(&procedure.name);
        if !database_names.insert(database_name.clone()) {
            return Err(generation_error(
                &decl.name,
                format!(
                    "procedure '{}' maps to '{}', which another procedure already uses",
                    procedure.name, database_name
                ),
            ));
        }

        procedures.push(compiled);
    }

    let implementation = Implementation {
        id: Uuid::new_v4(),
        declaration: decl.clone(),
        dialect: dialect.name(),
        procedures,
        by_name,
    };

    event!(Level::INFO, implementation = %implementation.id, "implementation generated");
    Ok(implementation)
}

fn compile_procedure(
    interface: &str,
    procedure: &ProcedureDecl,
    dialect: &dyn Dialect,
) -> Result<CompiledProcedure> {
    if !naming::is_identifier(&procedure.name) {
        return Err(generation_error(
            interface,
            format!("'{}' is not a valid procedure name", procedure.name),
        ));
    }

    let mut preprocessors = Vec::with_capacity(procedure.params.len());
    let mut param_names = HashSet::new();
    for param in &procedure.params {
        let at = format!("parameter '{}' of {}", param.name, procedure.name);

        if !naming::is_identifier(&param.name) {
            return Err(generation_error(interface, format!("{} has an invalid name", at)));
        }
        if !param_names.insert(param.name.as_str()) {
            return Err(generation_error(interface, format!("{} is declared twice", at)));
        }

        let preprocessor = match param.preprocessors.as_slice() {
            [] => None,
            [tag] => {
                if !tag.accepts(param.data_type) {
                    return Err(generation_error(
                        interface,
                        format!(
                            "{} is {}, but {} applies to {}",
                            at,
                            param.data_type,
                            tag,
                            tag.input_type()
                        ),
                    ));
                }
                Some(*tag)
            }
            tags => {
                let names: Vec<String> = tags.iter().map(ToString::to_string).collect();
                return Err(generation_error(
                    interface,
                    format!(
                        "{} carries {} pre-processors ({}), at most one is supported",
                        at,
                        tags.len(),
                        names.join(", ")
                    ),
                ));
            }
        };

        // Without a pre-processor the value is bound as is.
        if preprocessor.is_none() && !param.data_type.is_scalar() {
            return Err(generation_error(
                interface,
                format!("{} of type {} needs the bit_mask pre-processor", at, param.data_type),
            ));
        }

        preprocessors.push(preprocessor);
    }

    if let Some(shape) = procedure.returns.entity() {
        validate_shape(interface, procedure, shape, dialect)?;
    }

    let sql = dialect.build_stored_procedure_query(
        &dialect.to_database_name(&procedure.name),
        procedure.params.len(),
    );

    Ok(CompiledProcedure {
        decl: procedure.clone(),
        sql,
        preprocessors,
    })
}

fn validate_shape(
    interface: &str,
    procedure: &ProcedureDecl,
    shape: &EntityShape,
    dialect: &dyn Dialect,
) -> Result<()> {
    let at = format!("return entity {} of {}", shape.name, procedure.name);

    match shape.kind {
        ShapeKind::Scalar { data_type } => {
            if !data_type.is_scalar() {
                return Err(generation_error(
                    interface,
                    format!("{} has non-scalar type {}", at, data_type),
                ));
            }
        }
        ShapeKind::Record => {
            if shape.columns.is_empty() {
                return Err(generation_error(interface, format!("{} has no fields", at)));
            }

            let mut columns = HashSet::new();
            for field in shape.columns() {
                if !naming::is_identifier(&field.name) {
                    return Err(generation_error(
                        interface,
                        format!("{} has invalid field name '{}'", at, field.name),
                    ));
                }
                if !field.data_type.is_scalar() {
                    return Err(generation_error(
                        interface,
                        format!(
                            "{}: field '{}' of type {} cannot be read from a column",
                            at, field.name, field.data_type
                        ),
                    ));
                }
                let column = dialect.to_database_name(&field.name);
                if !columns.insert(column.clone()) {
                    return Err(generation_error(
                        interface,
                        format!("{}: two fields map to column '{}'", at, column),
                    ));
                }
            }
        }
    }

    Ok(())
}
