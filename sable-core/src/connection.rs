//! Connection: the single entry point into the library.
//!
//! A connection owns a boxed driver, the observer bus and the metadata
//! cache. It is a cheap clone handle; statements keep one so they can
//! reach the driver for rendering and execution.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::driver::{Config, Driver, MetadataCache, NullCache, ResultHandle};
use crate::events::{Event, EventBus, EventSubject, Observer, ObserverToken};
use crate::statement::{Statement, StatementKind};
use crate::Result;

struct ConnectionInner {
    driver: RefCell<Box<dyn Driver>>,
    events: RefCell<EventBus>,
    cache: Box<dyn MetadataCache>,
}

#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl Connection {
    /// Connect immediately through the given driver, without metadata
    /// caching
    pub fn open(driver: impl Driver + 'static, config: &Config) -> Result<Self> {
        Self::open_with_cache(driver, config, NullCache)
    }

    pub fn open_with_cache(
        mut driver: impl Driver + 'static,
        config: &Config,
        cache: impl MetadataCache + 'static,
    ) -> Result<Self> {
        driver.connect(config)?;
        tracing::info!(dialect = driver.dialect().name(), "connection opened");
        Ok(Self {
            inner: Rc::new(ConnectionInner {
                driver: RefCell::new(Box::new(driver)),
                events: RefCell::new(EventBus::new()),
                cache: Box::new(cache),
            }),
        })
    }

    pub fn close(&self) -> Result<()> {
        self.inner.driver.borrow_mut().close()
    }

    /// Start a SELECT statement over the given columns and table
    pub fn select(&self, columns: &[&str], source: &str) -> Statement {
        let mut stmt = Statement::new(self.clone(), StatementKind::Select, source);
        stmt.columns(columns.iter().copied());
        stmt
    }

    /// Start an INSERT statement; add values with `set` or `data`
    pub fn insert(&self, table: &str) -> Statement {
        Statement::new(self.clone(), StatementKind::Insert, table)
    }

    /// Start an UPDATE statement; add assignments with `set` or `data`
    pub fn update(&self, table: &str) -> Statement {
        Statement::new(self.clone(), StatementKind::Update, table)
    }

    pub fn delete(&self, table: &str) -> Statement {
        Statement::new(self.clone(), StatementKind::Delete, table)
    }

    pub fn attach_observer(
        &self,
        observer: Rc<dyn Observer>,
        interest: Event,
    ) -> ObserverToken {
        self.inner.events.borrow_mut().attach(observer, interest)
    }

    pub fn detach_observer(&self, token: ObserverToken) {
        self.inner.events.borrow_mut().detach(token);
    }

    pub fn begin_transaction(&self, savepoint: Option<&str>) -> Result<()> {
        self.inner.driver.borrow_mut().begin_transaction(savepoint)
    }

    pub fn commit(&self, savepoint: Option<&str>) -> Result<()> {
        self.inner.driver.borrow_mut().commit(savepoint)
    }

    pub fn rollback(&self, savepoint: Option<&str>) -> Result<()> {
        self.inner.driver.borrow_mut().rollback(savepoint)
    }

    pub(crate) fn driver(&self) -> Ref<'_, Box<dyn Driver>> {
        self.inner.driver.borrow()
    }

    pub(crate) fn driver_mut(&self) -> RefMut<'_, Box<dyn Driver>> {
        self.inner.driver.borrow_mut()
    }

    pub(crate) fn execute(&self, sql: &str) -> Result<ResultHandle> {
        self.inner.driver.borrow_mut().execute(sql)
    }

    /// Release a result set. Safe to call from drop paths; a driver
    /// borrow held elsewhere just leaves the handle to the backend.
    pub(crate) fn free_result(&self, handle: ResultHandle) {
        if let Ok(mut driver) = self.inner.driver.try_borrow_mut() {
            driver.free_result(handle);
        }
    }

    pub(crate) fn notify(&self, subject: &EventSubject<'_>, event: Event) {
        self.inner.events.borrow().notify(subject, event);
    }

    pub(crate) fn cache_fetch(&self, key: &str) -> Option<String> {
        self.inner.cache.fetch(key)
    }

    pub(crate) fn cache_store(&self, key: &str, value: &str) {
        self.inner.cache.store(key, value);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.driver().dialect().name())
            .finish_non_exhaustive()
    }
}
