//! Stored-procedure proxies.
//!
//! An [`InterfaceDecl`] is validated and compiled once per interface into an
//! [`Implementation`] (a dispatch table of SQL text, pre-processors and
//! return shapes). The [`ProxyFactory`] caches implementations and binds them
//! to sessions, either as the typed proxy emitted by `#[stored_procedures]` or
//! as a [`DynamicProxy`] driven by names and [`Value`](crate::Value)s.

mod declaration;
mod dynamic;
mod factory;
mod generator;

pub use declaration::{InterfaceDecl, ParamDecl, ProcedureDecl, ReturnShape};
pub use dynamic::{CallResult, DynamicProxy};
pub use factory::{InterfaceKey, ProcedureInterface, ProxyFactory};
pub use generator::{CompiledProcedure, Implementation, generate};
