use crate::types::{EntityId, FilterId};
use crate::world::ordered_set::OrderedIdSet;
use crate::world::registry::EntityClassData;

/// The filter and singleton-slot tables.
///
/// One filter per non-singleton [`FilterId`], materialized on first query
/// and eagerly maintained afterwards; one slot per singleton `FilterId`,
/// allocated up front. Construction and destruction fan out over a
/// class's own filter id plus its base ids, so polymorphic views stay
/// consistent without consulting the type hierarchy at query time.
pub struct Filters {
    filters: Vec<Option<OrderedIdSet>>,
    singletons: Vec<Option<EntityId>>,
}

impl Filters {
    pub fn new(filter_count: usize, singleton_count: usize) -> Self {
        let mut filters = Vec::new();
        filters.resize_with(filter_count, || None);
        Self {
            filters,
            singletons: vec![None; singleton_count],
        }
    }

    pub fn is_materialized(&self, filter_id: FilterId) -> bool {
        self.filters
            .get(filter_id.0 as usize)
            .is_some_and(|filter| filter.is_some())
    }

    /// Installs a freshly-scanned member list. The manager performs the
    /// scan; existing membership is replaced wholesale.
    pub(crate) fn materialize(&mut self, filter_id: FilterId, members: OrderedIdSet) {
        self.filters[filter_id.0 as usize] = Some(members);
    }

    /// Member ids of a materialized filter, ascending. Empty for filters
    /// nobody has queried yet.
    pub fn members(&self, filter_id: FilterId) -> &[EntityId] {
        self.filters
            .get(filter_id.0 as usize)
            .and_then(|filter| filter.as_ref())
            .map_or(&[], |filter| filter.as_slice())
    }

    /// Occupant of a singleton slot, when any.
    pub fn singleton(&self, filter_id: FilterId) -> Option<EntityId> {
        self.singletons.get(filter_id.0 as usize).copied().flatten()
    }

    /// Fans a constructed entity out into every applicable view.
    pub(crate) fn on_constructed(&mut self, class: &EntityClassData, id: EntityId) {
        if class.kind.is_singleton() {
            self.singletons[class.filter_id.0 as usize] = Some(id);
            for base in &class.base_ids {
                self.singletons[base.0 as usize] = Some(id);
            }
        } else {
            self.insert_if_materialized(class.filter_id, id);
            for base in &class.base_ids {
                self.insert_if_materialized(*base, id);
            }
        }
    }

    /// Clears a destroyed entity out of every applicable view.
    pub(crate) fn on_destroyed(&mut self, class: &EntityClassData, id: EntityId) {
        if class.kind.is_singleton() {
            self.clear_singleton_slot(class.filter_id, id);
            for base in &class.base_ids {
                self.clear_singleton_slot(*base, id);
            }
        } else {
            self.remove_if_materialized(class.filter_id, id);
            for base in &class.base_ids {
                self.remove_if_materialized(*base, id);
            }
        }
    }

    fn insert_if_materialized(&mut self, filter_id: FilterId, id: EntityId) {
        if let Some(Some(filter)) = self.filters.get_mut(filter_id.0 as usize) {
            filter.insert(id);
        }
    }

    fn remove_if_materialized(&mut self, filter_id: FilterId, id: EntityId) {
        if let Some(Some(filter)) = self.filters.get_mut(filter_id.0 as usize) {
            filter.remove_if_present(id);
        }
    }

    fn clear_singleton_slot(&mut self, filter_id: FilterId, id: EntityId) {
        let slot = &mut self.singletons[filter_id.0 as usize];
        // Only clear our own occupancy; a sibling class may have taken
        // the base slot since.
        if *slot == Some(id) {
            *slot = None;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.filters.iter_mut().for_each(|filter| *filter = None);
        self.singletons.fill(None);
    }
}
