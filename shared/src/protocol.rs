use thiserror::Error;

use crate::types::{ClassId, MaxHistorySize};
use crate::value_types::{FieldValue, ValueTypeError, ValueTypes};
use crate::world::entity::EntityLogic;
use crate::world::registry::{ClassDef, EntityTypes, RegistryError};

/// Errors raised by the protocol builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A mutation was attempted after the protocol was locked.
    #[error("Protocol is already locked")]
    AlreadyLocked,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ValueType(#[from] ValueTypeError),
}

/// Everything both sides must agree on before a manager exists: the
/// entity type map, the value-type registry, the tick rate, and the
/// rewind history depth.
///
/// Built incrementally, then locked; `lock` resolves the class registry
/// and freezes every table. Managers require a locked protocol.
pub struct Protocol {
    pub entity_types: EntityTypes,
    pub value_types: ValueTypes,
    /// Fixed logic rate in ticks per second.
    pub frames_per_second: u16,
    pub max_history_size: MaxHistorySize,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            entity_types: EntityTypes::new(),
            value_types: ValueTypes::with_builtins(),
            frames_per_second: 60,
            max_history_size: MaxHistorySize::Ticks32,
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_entity<T: EntityLogic>(&mut self, class_id: ClassId, def: ClassDef) -> &mut Self {
        self.check_lock();
        self.entity_types.register::<T>(class_id, def);
        self
    }

    /// Registers a custom field value type. Built-in scalars and
    /// `FloatAngle` are present from the start.
    pub fn register_field_type<T: FieldValue>(&mut self) -> &mut Self {
        self.check_lock();
        self.value_types.register::<T>();
        self
    }

    /// Registers a custom field value type with an interpolation
    /// override.
    pub fn register_field_type_with_interpolator<T: FieldValue>(
        &mut self,
        interpolate: fn(T, T, f32) -> T,
    ) -> &mut Self {
        self.check_lock();
        self.value_types.register_with_interpolator::<T>(interpolate);
        self
    }

    pub fn tick_rate(&mut self, frames_per_second: u16) -> &mut Self {
        self.check_lock();
        self.frames_per_second = frames_per_second;
        self
    }

    pub fn history_size(&mut self, size: MaxHistorySize) -> &mut Self {
        self.check_lock();
        self.max_history_size = size;
        self
    }

    // Non-panicking builder methods

    pub fn try_add_entity<T: EntityLogic>(
        &mut self,
        class_id: ClassId,
        def: ClassDef,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.entity_types.try_register::<T>(class_id, def)?;
        Ok(self)
    }

    pub fn try_register_field_type<T: FieldValue>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.value_types.try_register::<T>()?;
        Ok(self)
    }

    pub fn try_tick_rate(&mut self, frames_per_second: u16) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.frames_per_second = frames_per_second;
        Ok(self)
    }

    pub fn try_history_size(&mut self, size: MaxHistorySize) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.max_history_size = size;
        Ok(self)
    }

    /// Validates field types, resolves the class registry, and freezes
    /// the protocol.
    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.entity_types.validate_field_types(&self.value_types)?;
        self.entity_types.resolve()?;
        self.locked = true;
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if already locked or if any registration is inconsistent.
    /// Use `try_lock` for non-panicking error handling.
    pub fn lock(&mut self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
        self.try_lock().expect("protocol failed to lock");
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns Err if the protocol is locked.
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Panics if the protocol is locked.
    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }
}
