//! Application correlation tokens

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque value attached to a registration and handed back with every event for it
///
/// The library never looks inside; the application recovers its value with
/// [`Closure::downcast_ref`].
#[derive(Clone, Default)]
pub struct Closure(Option<Arc<dyn Any + Send + Sync>>);

impl Closure {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Closure(..)"),
            None => f.write_str("Closure(none)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_come_back_by_type() {
        let closure = Closure::new(String::from("desk-7"));
        assert_eq!(closure.downcast_ref::<String>().map(String::as_str), Some("desk-7"));
        assert!(closure.downcast_ref::<u32>().is_none());
        assert!(Closure::none().downcast_ref::<String>().is_none());
        assert!(Closure::default().is_none());
    }
}
