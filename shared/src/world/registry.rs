use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem::size_of;

use log::info;
use thiserror::Error;

use crate::types::{ClassId, FieldId, FilterId, CONTROLLERS_FILTER_ID};
use crate::value_types::{FieldValue, ValueTypeError, ValueTypes};
use crate::world::entity::{EntityConstructor, EntityLogic};

/// Errors raised during class registration and class lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two types were registered under the same class id.
    #[error("Class id {class_id} is already taken by {existing}")]
    DuplicateClassId {
        class_id: u16,
        existing: &'static str,
    },

    /// The same type was registered twice.
    #[error("Entity type {type_name} is already registered")]
    TypeAlreadyRegistered { type_name: &'static str },

    /// A declared ancestor was never registered itself.
    #[error("{type_name} declares unregistered base type {base_name}")]
    UnregisteredBase {
        type_name: &'static str,
        base_name: &'static str,
    },

    /// A class chain mixes singleton and non-singleton classes.
    #[error("{type_name} and its base {base_name} disagree on singleton-ness; mixed chains are not supported")]
    SingletonBaseMismatch {
        type_name: &'static str,
        base_name: &'static str,
    },

    /// A class id with no registration behind it reached a spawn or query.
    #[error("Class id {class_id} is not registered")]
    UnregisteredClass { class_id: u16 },

    /// A type with no registration behind it reached a query.
    #[error("Entity type {type_name} is not registered")]
    UnregisteredType { type_name: &'static str },

    /// Base-id resolution has not run yet; the protocol must be locked
    /// before managers are built.
    #[error("Class registry is not resolved; lock the protocol first")]
    NotResolved,
}

/// Per-class behavior flags. Only `UPDATEABLE` and `UPDATE_ON_CLIENT`
/// are interpreted by the core; the rest belong to the serializer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFlags(pub u16);

impl EntityFlags {
    pub const NONE: EntityFlags = EntityFlags(0);
    /// The entity receives per-tick updates on the side that owns it.
    pub const UPDATEABLE: EntityFlags = EntityFlags(1 << 0);
    /// The entity is also ticked on clients that do not own it.
    pub const UPDATE_ON_CLIENT: EntityFlags = EntityFlags(1 << 1);

    pub fn contains(self, other: EntityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: EntityFlags) -> EntityFlags {
        EntityFlags(self.0 | other.0)
    }
}

/// Per-field replication flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncFlags(pub u16);

impl SyncFlags {
    pub const NONE: SyncFlags = SyncFlags(0);
    /// The renderer interpolates this field between the last two states.
    pub const INTERPOLATED: SyncFlags = SyncFlags(1 << 0);
    /// The field's history is retained for lag-compensated rewind.
    pub const LAG_COMPENSATED: SyncFlags = SyncFlags(1 << 1);
    /// The field is only replicated to players other than the owner.
    pub const ONLY_FOR_OTHER_PLAYERS: SyncFlags = SyncFlags(1 << 2);
    /// The field is only replicated to the owning player.
    pub const ONLY_FOR_OWNER: SyncFlags = SyncFlags(1 << 3);
    /// The field always participates in rollback, owner or not.
    pub const ALWAYS_ROLLBACK: SyncFlags = SyncFlags(1 << 4);
    /// The field never participates in rollback.
    pub const NEVER_ROLLBACK: SyncFlags = SyncFlags(1 << 5);

    pub fn contains(self, other: SyncFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: SyncFlags) -> SyncFlags {
        SyncFlags(self.0 | other.0)
    }
}

/// A field as declared by the host.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub id: FieldId,
    pub sync_flags: SyncFlags,
    pub has_change_notification: bool,
    value_type: TypeId,
    value_type_name: &'static str,
    size: usize,
}

impl FieldDef {
    pub fn of<T: FieldValue>(id: FieldId, sync_flags: SyncFlags) -> Self {
        Self {
            id,
            sync_flags,
            has_change_notification: false,
            value_type: TypeId::of::<T>(),
            value_type_name: type_name::<T>(),
            size: size_of::<T>(),
        }
    }

    /// Marks the field as raising a change callback on the receiving side.
    pub fn with_change_notification(mut self) -> Self {
        self.has_change_notification = true;
        self
    }
}

/// Resolved per-field layout stored on the class data.
#[derive(Clone, Copy, Debug)]
pub struct EntityFieldInfo {
    pub id: FieldId,
    pub size: usize,
    pub sync_flags: SyncFlags,
    pub has_change_notification: bool,
    /// Offset of the authoritative slot in the per-entity state block.
    pub fixed_offset: usize,
    /// Offset of the prediction slot; present only for predicted fields.
    pub predicted_offset: Option<usize>,
    pub is_predicted: bool,
}

impl EntityFieldInfo {
    fn from_def(def: &FieldDef, fixed_offset: usize, predicted_offset: Option<usize>) -> Self {
        let is_predicted = def.sync_flags.contains(SyncFlags::ALWAYS_ROLLBACK)
            || (!def.sync_flags.contains(SyncFlags::ONLY_FOR_OTHER_PLAYERS)
                && !def.sync_flags.contains(SyncFlags::NEVER_ROLLBACK));
        Self {
            id: def.id,
            size: def.size,
            sync_flags: def.sync_flags,
            has_change_notification: def.has_change_notification,
            fixed_offset,
            predicted_offset,
            is_predicted,
        }
    }
}

/// Where a class sits in the view taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// A world entity; may be lag-compensated.
    Normal,
    /// A player controller; always a member of the all-controllers view.
    Controller,
    /// At most one live instance; stored in a singleton slot, not a filter.
    Singleton,
}

impl ClassKind {
    pub fn is_singleton(self) -> bool {
        self == ClassKind::Singleton
    }
}

/// A class as declared by the host, before registration resolves it.
pub struct ClassDef {
    kind: ClassKind,
    flags: EntityFlags,
    fields: Vec<FieldDef>,
    base_types: Vec<(TypeId, &'static str)>,
    constructor: EntityConstructor,
}

impl ClassDef {
    pub fn new(kind: ClassKind, constructor: EntityConstructor) -> Self {
        Self {
            kind,
            flags: EntityFlags::NONE,
            fields: Vec::new(),
            base_types: Vec::new(),
            constructor,
        }
    }

    pub fn normal(constructor: EntityConstructor) -> Self {
        Self::new(ClassKind::Normal, constructor)
    }

    pub fn controller(constructor: EntityConstructor) -> Self {
        Self::new(ClassKind::Controller, constructor)
    }

    pub fn singleton(constructor: EntityConstructor) -> Self {
        Self::new(ClassKind::Singleton, constructor)
    }

    pub fn flags(mut self, flags: EntityFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Declares an ancestor class. Instances of this class also join the
    /// filters (or singleton slots) of every declared ancestor.
    pub fn base<B: EntityLogic>(mut self) -> Self {
        self.base_types.push((TypeId::of::<B>(), type_name::<B>()));
        self
    }
}

/// Everything the manager knows about one registered class.
pub struct EntityClassData {
    pub class_id: ClassId,
    pub type_name: &'static str,
    pub kind: ClassKind,
    pub filter_id: FilterId,
    /// Filter ids of the declared ancestor chain (plus the controllers
    /// view for controller classes). Populated by the resolve pass.
    pub base_ids: Vec<FilterId>,
    pub flags: EntityFlags,
    pub fields: Vec<EntityFieldInfo>,
    pub lag_compensated_count: usize,
    /// Total bytes of the authoritative state block.
    pub fixed_size: usize,
    /// Total bytes of the prediction state block.
    pub predicted_size: usize,
    pub constructor: EntityConstructor,
    cache_pool: RefCell<Vec<Vec<u8>>>,
}

impl EntityClassData {
    /// Whether instances of this class belong in the given filter.
    pub fn joins_filter(&self, filter_id: FilterId) -> bool {
        self.filter_id == filter_id || self.base_ids.contains(&filter_id)
    }

    /// Takes a zeroed state buffer from the pool, allocating on a miss.
    pub fn take_data_cache(&self) -> Vec<u8> {
        self.cache_pool
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| vec![0; self.fixed_size])
    }

    /// Returns a state buffer for reuse by the next instance.
    pub fn release_data_cache(&self, mut cache: Vec<u8>) {
        cache.fill(0);
        self.cache_pool.borrow_mut().push(cache);
    }
}

struct Registration {
    class_id: ClassId,
    def: ClassDef,
    type_id: TypeId,
    type_name: &'static str,
}

/// The class registry: maps every entity subtype to its [`ClassId`],
/// dense [`FilterId`], base-id fan-out list, and layout metadata.
///
/// Registration happens through the protocol builder; `resolve` runs at
/// lock time and the registry is read-only afterwards.
pub struct EntityTypes {
    pending: Vec<Registration>,
    classes: Vec<Option<EntityClassData>>,
    type_to_class: HashMap<TypeId, ClassId>,
    /// Next non-singleton filter id; 0 is the controllers view.
    next_filter: u16,
    next_singleton: u16,
    resolved: bool,
}

impl Default for EntityTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTypes {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            classes: Vec::new(),
            type_to_class: HashMap::new(),
            next_filter: CONTROLLERS_FILTER_ID.0 + 1,
            next_singleton: 0,
            resolved: false,
        }
    }

    pub fn try_register<T: EntityLogic>(
        &mut self,
        class_id: ClassId,
        def: ClassDef,
    ) -> Result<(), RegistryError> {
        let type_id = TypeId::of::<T>();
        if self.type_to_class.contains_key(&type_id) {
            return Err(RegistryError::TypeAlreadyRegistered {
                type_name: type_name::<T>(),
            });
        }
        if let Some(existing) = self.pending.iter().find(|r| r.class_id == class_id) {
            return Err(RegistryError::DuplicateClassId {
                class_id: class_id.0,
                existing: existing.type_name,
            });
        }

        self.type_to_class.insert(type_id, class_id);
        self.pending.push(Registration {
            class_id,
            def,
            type_id,
            type_name: type_name::<T>(),
        });
        Ok(())
    }

    /// # Panics
    ///
    /// Panics on duplicate registration. Use `try_register` for
    /// non-panicking error handling.
    pub fn register<T: EntityLogic>(&mut self, class_id: ClassId, def: ClassDef) {
        self.try_register::<T>(class_id, def)
            .expect("entity class registered twice")
    }

    /// Second registration pass: assigns dense filter ids in registration
    /// order, computes field layouts, and resolves every declared base
    /// type to its filter id. Called once when the protocol locks.
    pub(crate) fn resolve(&mut self) -> Result<(), RegistryError> {
        if self.resolved {
            return Ok(());
        }

        // First pass: dense filter id assignment, layout computation.
        let mut filter_ids: HashMap<TypeId, (FilterId, ClassKind)> = HashMap::new();
        let registrations = std::mem::take(&mut self.pending);
        let highest_class = registrations
            .iter()
            .map(|r| r.class_id.0 as usize)
            .max()
            .map_or(0, |max| max + 1);
        let mut classes: Vec<Option<EntityClassData>> = Vec::with_capacity(highest_class);
        classes.resize_with(highest_class, || None);

        for registration in &registrations {
            let kind = registration.def.kind;
            let filter_id = if kind.is_singleton() {
                let id = FilterId(self.next_singleton);
                self.next_singleton += 1;
                id
            } else {
                let id = FilterId(self.next_filter);
                self.next_filter += 1;
                id
            };
            filter_ids.insert(registration.type_id, (filter_id, kind));

            let mut fields = Vec::with_capacity(registration.def.fields.len());
            let mut fixed_size = 0;
            let mut predicted_size = 0;
            let mut lag_compensated_count = 0;
            for def in &registration.def.fields {
                let probe = EntityFieldInfo::from_def(def, 0, None);
                let predicted_offset = probe.is_predicted.then_some(predicted_size);
                fields.push(EntityFieldInfo::from_def(def, fixed_size, predicted_offset));
                fixed_size += def.size;
                if probe.is_predicted {
                    predicted_size += def.size;
                }
                if def.sync_flags.contains(SyncFlags::LAG_COMPENSATED) {
                    lag_compensated_count += 1;
                }
            }

            classes[registration.class_id.0 as usize] = Some(EntityClassData {
                class_id: registration.class_id,
                type_name: registration.type_name,
                kind,
                filter_id,
                base_ids: Vec::new(),
                flags: registration.def.flags,
                fields,
                lag_compensated_count,
                fixed_size,
                predicted_size,
                constructor: registration.def.constructor,
                cache_pool: RefCell::new(Vec::new()),
            });

            info!(
                "Registered entity class {} as class id {} (filter id {})",
                registration.type_name, registration.class_id.0, filter_id.0
            );
        }

        // Second pass: resolve declared ancestors to their filter ids.
        for registration in &registrations {
            let kind = registration.def.kind;
            let mut base_ids = Vec::with_capacity(registration.def.base_types.len() + 1);
            for &(base_type, base_name) in &registration.def.base_types {
                let Some((base_filter, base_kind)) = filter_ids.get(&base_type) else {
                    return Err(RegistryError::UnregisteredBase {
                        type_name: registration.type_name,
                        base_name,
                    });
                };
                if base_kind.is_singleton() != kind.is_singleton() {
                    return Err(RegistryError::SingletonBaseMismatch {
                        type_name: registration.type_name,
                        base_name,
                    });
                }
                base_ids.push(*base_filter);
            }
            if kind == ClassKind::Controller {
                base_ids.push(CONTROLLERS_FILTER_ID);
            }

            let class = classes[registration.class_id.0 as usize]
                .as_mut()
                .expect("class data filled in the first pass");
            class.base_ids = base_ids;
        }

        self.classes = classes;
        self.resolved = true;
        Ok(())
    }

    /// Verifies that every declared field uses a registered value type.
    /// Runs before `resolve`, while declarations are still pending.
    pub(crate) fn validate_field_types(
        &self,
        value_types: &ValueTypes,
    ) -> Result<(), ValueTypeError> {
        for registration in &self.pending {
            for field in &registration.def.fields {
                if !value_types.is_registered(&field.value_type) {
                    return Err(ValueTypeError::NotRegistered {
                        type_name: field.value_type_name,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn class(&self, class_id: ClassId) -> Option<&EntityClassData> {
        self.classes.get(class_id.0 as usize)?.as_ref()
    }

    pub fn try_class(&self, class_id: ClassId) -> Result<&EntityClassData, RegistryError> {
        if !self.resolved {
            return Err(RegistryError::NotResolved);
        }
        self.class(class_id).ok_or(RegistryError::UnregisteredClass {
            class_id: class_id.0,
        })
    }

    pub fn class_id_of<T: EntityLogic>(&self) -> Option<ClassId> {
        self.type_to_class.get(&TypeId::of::<T>()).copied()
    }

    pub fn class_of<T: EntityLogic>(&self) -> Option<&EntityClassData> {
        self.class(self.class_id_of::<T>()?)
    }

    pub fn try_class_of<T: EntityLogic>(&self) -> Result<&EntityClassData, RegistryError> {
        if !self.resolved {
            return Err(RegistryError::NotResolved);
        }
        self.class_of::<T>().ok_or(RegistryError::UnregisteredType {
            type_name: type_name::<T>(),
        })
    }

    /// Number of non-singleton filter slots, the controllers view included.
    pub fn filter_count(&self) -> usize {
        self.next_filter as usize
    }

    pub fn singleton_count(&self) -> usize {
        self.next_singleton as usize
    }
}
