//! Record lifecycle observers
//!
//! A model may carry one observer whose hooks bracket the persistence
//! lifecycle of its records. All hooks default to no-ops; an observer
//! implements only what it needs. Returning an error from a `before_*`
//! hook aborts the operation before any write is issued.

use std::rc::Rc;

use crate::error::OrmResult;
use crate::record::Record;

pub trait Observer {
    fn before_save(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_save(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn before_insert(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_insert(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn before_update(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_update(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn before_delete(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_delete(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn before_filter(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_filter(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
}

/// Shared observer handle as stored on a model spec.
pub type ObserverHandle = Rc<dyn Observer>;
