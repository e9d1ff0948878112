use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use lazy_static::lazy_static;
use tracing::{Level, event};
use crate::core::{DbError, Result};
use crate::dialect::{Dialect, PostgreSqlDialect};
use crate::session::Session;
use super::declaration::InterfaceDecl;
use super::dynamic::DynamicProxy;
use super::generator::{Implementation, generate};

/// A typed stored-procedure interface.
///
/// Implemented for `dyn Trait` by `#[stored_procedures]`.
pub trait ProcedureInterface: 'static {
    /// Session-bound call surface implementing the trait.
    type Proxy<'s>;

    fn declaration() -> InterfaceDecl;

    fn bind<'s>(implementation: Arc<Implementation>, session: &'s mut Session) -> Self::Proxy<'s>;
}

/// Identity of a cached implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InterfaceKey {
    Type(TypeId),
    Named(String),
}

type Slot = Arc<Mutex<Option<Arc<Implementation>>>>;

// Global factory over the PostgreSQL dialect
lazy_static! {
    static ref GLOBAL_FACTORY: ProxyFactory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
}

/// Generates each interface once and hands out session-bound proxies
///
/// Implementations are cached for the lifetime of the factory and never
/// invalidated. Concurrent first use of one interface is serialized on a
/// per-key slot, so exactly one generation runs; a failed generation leaves the
/// slot empty and the next caller retries.
pub struct ProxyFactory {
    dialect: Arc<dyn Dialect>,
    cache: Mutex<HashMap<InterfaceKey, Slot>>,
    generations: AtomicUsize,
}

impl ProxyFactory {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            cache: Mutex::new(HashMap::new()),
            generations: AtomicUsize::new(0),
        }
    }

    /// Process-wide factory using the PostgreSQL dialect
    pub fn global() -> &'static ProxyFactory {
        &GLOBAL_FACTORY
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn dialect_handle(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.dialect)
    }

    /// Number of generation runs that produced an implementation.
    pub fn generation_count(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn is_cached(&self, key: &InterfaceKey) -> Result<bool> {
        let slot = self.cache.lock()?.get(key).cloned();
        match slot {
            Some(slot) => Ok(slot.lock()?.is_some()),
            None => Ok(false),
        }
    }

    pub fn is_interface_cached<I: ProcedureInterface + ?Sized>(&self) -> Result<bool> {
        self.is_cached(&InterfaceKey::Type(TypeId::of::<I>()))
    }

    /// The cached implementation of `I`, generating it on first use.
    pub fn implementation<I: ProcedureInterface + ?Sized>(&self) -> Result<Arc<Implementation>> {
        self.resolve(InterfaceKey::Type(TypeId::of::<I>()), I::declaration)
    }

    /// Bind the implementation of `I` to `session`
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut orders = ProxyFactory::global().get_proxy::<dyn OrderRepository>(&mut session)?;
    /// let order = orders.get_order(7)?;
    /// ```
    pub fn get_proxy<'s, I: ProcedureInterface + ?Sized>(
        &self,
        session: &'s mut Session,
    ) -> Result<I::Proxy<'s>> {
        let implementation = self.implementation::<I>()?;
        self.check_dialect(&implementation, session);
        Ok(I::bind(implementation, session))
    }

    /// Bind a declaration loaded at runtime. Declarations are keyed by name.
    pub fn get_dynamic_proxy<'s>(
        &self,
        decl: &InterfaceDecl,
        session: &'s mut Session,
    ) -> Result<DynamicProxy<'s>> {
        let implementation = self.resolve(InterfaceKey::Named(decl.name.clone()), || decl.clone())?;
        if implementation.declaration() != decl {
            return Err(DbError::GenerationError(format!(
                "interface '{}' was already generated from a different declaration",
                decl.name
            )));
        }
        self.check_dialect(&implementation, session);
        Ok(DynamicProxy::new(implementation, session))
    }

    fn resolve<F>(&self, key: InterfaceKey, declaration: F) -> Result<Arc<Implementation>>
    where
        F: FnOnce() -> InterfaceDecl,
    {
        let slot = {
            let mut cache = self.cache.lock()?;
            Arc::clone(cache.entry(key.clone()).or_default())
        };

        let mut slot = slot.lock()?;
        if let Some(implementation) = slot.as_ref() {
            event!(Level::DEBUG, key = ?key, "proxy cache hit");
            return Ok(Arc::clone(implementation));
        }

        event!(Level::DEBUG, key = ?key, "proxy cache miss");
        let implementation = Arc::new(generate(&declaration(), self.dialect.as_ref())?);
        self.generations.fetch_add(1, Ordering::SeqCst);
        *slot = Some(Arc::clone(&implementation));
        Ok(implementation)
    }

    fn check_dialect(&self, implementation: &Implementation, session: &Session) {
        if session.dialect().name() != implementation.dialect_name() {
            event!(
                Level::WARN,
                interface = %implementation.interface_name(),
                factory_dialect = implementation.dialect_name(),
                session_dialect = session.dialect().name(),
                "proxy generated for a different dialect than the session uses"
            );
        }
    }
}

impl std::fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("dialect", &self.dialect.name())
            .field("generations", &self.generation_count())
            .finish()
    }
}
