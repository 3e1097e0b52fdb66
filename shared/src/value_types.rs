use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::mem::size_of;

use thiserror::Error;

/// Errors raised by the value-type registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueTypeError {
    /// A field type was registered twice.
    #[error("Field type {type_name} is already registered")]
    AlreadyRegistered { type_name: &'static str },

    /// A field declaration names a type that was never registered.
    #[error("Field type {type_name} is not registered; register it before locking the protocol")]
    NotRegistered { type_name: &'static str },
}

/// A value that can live in a replicated entity field: copyable,
/// comparable for change detection, and interpolatable for rendering.
///
/// The default interpolation snaps to the target, which is correct for
/// discrete values (ids, counters, flags). Continuous types override it.
pub trait FieldValue: Copy + PartialEq + std::fmt::Debug + 'static {
    fn interpolate(from: Self, to: Self, _t: f32) -> Self {
        let _ = from;
        to
    }

    /// Whether this type carries a real interpolation (not snap-to-target).
    const INTERPOLATED: bool = false;
}

macro_rules! snap_field_value {
    ($($t:ty),*) => {
        $(impl FieldValue for $t {})*
    };
}

snap_field_value!(bool, u8, i8, u16, i16, u32, i32, u64, i64);

impl FieldValue for f32 {
    fn interpolate(from: Self, to: Self, t: f32) -> Self {
        from + (to - from) * t
    }

    const INTERPOLATED: bool = true;
}

impl FieldValue for f64 {
    fn interpolate(from: Self, to: Self, t: f32) -> Self {
        from + (to - from) * f64::from(t)
    }

    const INTERPOLATED: bool = true;
}

/// An angle in degrees that interpolates along the shortest arc, so a
/// sweep from 350° to 10° passes through 0° rather than 180°.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatAngle(pub f32);

impl FloatAngle {
    pub fn degrees(self) -> f32 {
        self.0
    }

    fn wrap(value: f32) -> f32 {
        value.rem_euclid(360.0)
    }
}

impl FieldValue for FloatAngle {
    fn interpolate(from: Self, to: Self, t: f32) -> Self {
        let mut arc = Self::wrap(to.0) - Self::wrap(from.0);
        if arc > 180.0 {
            arc -= 360.0;
        } else if arc < -180.0 {
            arc += 360.0;
        }
        FloatAngle(Self::wrap(from.0 + arc * t))
    }

    const INTERPOLATED: bool = true;
}

/// Descriptor held per registered field type.
#[derive(Clone, Copy, Debug)]
pub struct ValueTypeInfo {
    pub type_name: &'static str,
    pub size: usize,
    pub interpolated: bool,
}

struct ValueTypeEntry {
    info: ValueTypeInfo,
    /// Type-erased `fn(T, T, f32) -> T` override, when one was
    /// registered alongside the type.
    interpolator: Option<Box<dyn std::any::Any + Send + Sync>>,
}

/// Registry of every type usable as an entity field, keyed by `TypeId`.
///
/// Built-ins (scalars and `FloatAngle`) are installed before any manager
/// exists; hosts add custom types through the protocol builder, after
/// which the registry is immutable.
pub struct ValueTypes {
    registered: HashMap<TypeId, ValueTypeEntry>,
}

impl ValueTypes {
    pub(crate) fn with_builtins() -> Self {
        let mut value_types = Self {
            registered: HashMap::new(),
        };
        value_types.register_builtin::<bool>();
        value_types.register_builtin::<u8>();
        value_types.register_builtin::<i8>();
        value_types.register_builtin::<u16>();
        value_types.register_builtin::<i16>();
        value_types.register_builtin::<u32>();
        value_types.register_builtin::<i32>();
        value_types.register_builtin::<u64>();
        value_types.register_builtin::<i64>();
        value_types.register_builtin::<f32>();
        value_types.register_builtin::<f64>();
        value_types.register_builtin::<FloatAngle>();
        value_types
    }

    fn register_builtin<T: FieldValue>(&mut self) {
        self.try_register::<T>()
            .expect("built-in field types register exactly once");
    }

    pub fn try_register<T: FieldValue>(&mut self) -> Result<(), ValueTypeError> {
        self.try_insert::<T>(None, T::INTERPOLATED)
    }

    /// Registers a field type with an interpolation override that wins
    /// over the type's own `FieldValue::interpolate`.
    pub fn try_register_with_interpolator<T: FieldValue>(
        &mut self,
        interpolate: fn(T, T, f32) -> T,
    ) -> Result<(), ValueTypeError> {
        self.try_insert::<T>(Some(Box::new(interpolate)), true)
    }

    fn try_insert<T: FieldValue>(
        &mut self,
        interpolator: Option<Box<dyn std::any::Any + Send + Sync>>,
        interpolated: bool,
    ) -> Result<(), ValueTypeError> {
        let type_id = TypeId::of::<T>();
        if self.registered.contains_key(&type_id) {
            return Err(ValueTypeError::AlreadyRegistered {
                type_name: type_name::<T>(),
            });
        }
        self.registered.insert(
            type_id,
            ValueTypeEntry {
                info: ValueTypeInfo {
                    type_name: type_name::<T>(),
                    size: size_of::<T>(),
                    interpolated,
                },
                interpolator,
            },
        );
        Ok(())
    }

    /// Registers a custom field type.
    ///
    /// # Panics
    ///
    /// Panics if the type is already registered. Use `try_register` for
    /// non-panicking error handling.
    pub fn register<T: FieldValue>(&mut self) {
        self.try_register::<T>()
            .expect("field type registered twice")
    }

    /// # Panics
    ///
    /// Panics if the type is already registered.
    pub fn register_with_interpolator<T: FieldValue>(&mut self, interpolate: fn(T, T, f32) -> T) {
        self.try_register_with_interpolator::<T>(interpolate)
            .expect("field type registered twice")
    }

    pub fn is_registered(&self, type_id: &TypeId) -> bool {
        self.registered.contains_key(type_id)
    }

    pub fn info(&self, type_id: &TypeId) -> Option<&ValueTypeInfo> {
        self.registered.get(type_id).map(|entry| &entry.info)
    }

    /// Interpolates with the registered override when present, falling
    /// back to the type's own implementation.
    pub fn interpolate<T: FieldValue>(&self, from: T, to: T, t: f32) -> T {
        let override_fn = self
            .registered
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.interpolator.as_ref())
            .and_then(|erased| erased.downcast_ref::<fn(T, T, f32) -> T>())
            .copied();
        match override_fn {
            Some(interpolate) => interpolate(from, to, t),
            None => T::interpolate(from, to, t),
        }
    }
}


#[cfg(test)]
mod registry_tests {
    use super::{FieldValue, ValueTypeError, ValueTypes};

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Ammo(u16);

    impl FieldValue for Ammo {}

    #[test]
    fn builtins_are_present() {
        let value_types = ValueTypes::with_builtins();
        assert!(value_types.is_registered(&std::any::TypeId::of::<f32>()));
        assert!(value_types.is_registered(&std::any::TypeId::of::<super::FloatAngle>()));
    }

    #[test]
    fn custom_type_registers_once() {
        let mut value_types = ValueTypes::with_builtins();
        value_types.register::<Ammo>();
        assert!(matches!(
            value_types.try_register::<Ammo>(),
            Err(ValueTypeError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn interpolator_override_wins_over_the_trait_default() {
        let mut value_types = ValueTypes::with_builtins();
        // Ammo would snap to target by default; register a floor lerp.
        value_types.register_with_interpolator::<Ammo>(|from, to, t| {
            Ammo(from.0 + ((f32::from(to.0) - f32::from(from.0)) * t) as u16)
        });

        assert_eq!(value_types.interpolate(Ammo(0), Ammo(10), 0.5), Ammo(5));
        // Types without an override keep their own behavior.
        assert_eq!(value_types.interpolate(0u16, 10u16, 0.5), 10u16);
    }
}
