use dyn_clone::DynClone;
use std::{
    any::{type_name, Any, TypeId},
    fmt::{self, Debug},
};

/// Conversion to [`Any`] to workaround [#65991](https://github.com/rust-lang/rust/issues/65991).
/// Implemented for anything that's `'static` and [`Clone`].
pub trait IntoAny: DynClone + Any + Send + Sync {
    /// The conversion.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
    fn as_any(&self) -> &dyn Any;
    /// Name of the concrete type, for diagnostics
    fn type_name(&self) -> &'static str;
}

dyn_clone::clone_trait_object!(IntoAny);

impl<T: 'static + Clone + Send + Sync> IntoAny for T {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        Box::new(*self)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl Debug for dyn IntoAny + Send + Sync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let any = self.as_any();
        if let Some(value) = any.downcast_ref::<String>() {
            return write!(f, "{:?}", value);
        } else if let Some(value) = any.downcast_ref::<f64>() {
            return write!(f, "{:?}", value);
        } else if let Some(value) = any.downcast_ref::<i64>() {
            return write!(f, "{:?}", value);
        } else if let Some(value) = any.downcast_ref::<bool>() {
            return write!(f, "{:?}", value);
        } else if let Some(value) = any.downcast_ref::<serde_json::Value>() {
            return write!(f, "{}", value);
        }

        write!(f, "dyn IntoAny<{}>", self.type_name())
    }
}

/// A [`Box`]ed [`IntoAny`], used for side-channel action results.
pub type DynAny = Box<dyn IntoAny + Send + Sync>;

/// Take the value out of a [`DynAny`] if it holds a `T`, handing the box
/// back otherwise.
pub fn downcast<T: 'static>(value: DynAny) -> Result<T, DynAny> {
    if (*value).as_any().type_id() != TypeId::of::<T>() {
        return Err(value);
    }
    match value.into_any().downcast::<T>() {
        Ok(boxed) => Ok(*boxed),
        // Unreachable after the type id check; the value was consumed by `into_any`.
        Err(_) => unreachable!("type id checked above"),
    }
}

/// Borrow the value of a [`DynAny`] as `T`.
pub fn downcast_ref<T: 'static>(value: &DynAny) -> Option<&T> {
    (**value).as_any().downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Summary {
        lines: usize,
    }

    #[test]
    fn test_downcast_roundtrip() {
        let value: DynAny = Box::new(Summary { lines: 3 });
        assert_eq!(downcast_ref::<Summary>(&value), Some(&Summary { lines: 3 }));
        let value = downcast::<String>(value).unwrap_err();
        assert_eq!(downcast::<Summary>(value).unwrap(), Summary { lines: 3 });
    }

    #[test]
    fn test_debug_names_unknown_types() {
        let value: DynAny = Box::new(Summary { lines: 1 });
        assert!(format!("{:?}", value).contains("Summary"));
        let value: DynAny = Box::new("text".to_string());
        assert_eq!(format!("{:?}", value), "\"text\"");
    }
}
