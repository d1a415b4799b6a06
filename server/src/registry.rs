//! Id-keyed entity collections with change notification.
//!
//! A registry is the only place where collection membership changes. Every
//! change that actually alters membership is published to each subscriber as
//! a [`RegistryEvent`] over an unbounded channel, so the room can turn it
//! into a patch without the registry knowing anything about the network.
//! Empty emissions are suppressed.

use log::debug;
use shared::EntityId;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Something the world owns and clients may mirror
pub trait Entity {
    /// Serializable view derived from live fields
    type State: Clone;

    /// Stable key within the owning registry
    fn id(&self) -> EntityId;

    /// Builds the state clients mirror. Called on every add, update and
    /// full-state read, so it must not have side effects.
    fn state(&self) -> Self::State;
}

/// One membership or field change, carrying only the entities it touched
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent<S> {
    Added(Vec<S>),
    Updated(Vec<S>),
    Deleted(Vec<EntityId>),
}

/// Handle for cancelling a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a registry subscription
#[derive(Debug)]
pub struct Subscription<S> {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<RegistryEvent<S>>,
}

impl<S> Subscription<S> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next pending event without waiting
    pub fn try_next(&mut self) -> Option<RegistryEvent<S>> {
        self.receiver.try_recv().ok()
    }

    /// All pending events, oldest first
    pub fn drain(&mut self) -> Vec<RegistryEvent<S>> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}

/// Named collection of entities keyed by id
///
/// Iteration follows insertion order, which is also the order used for
/// full-state reads. Members can be mutated in place through
/// [`EntityRegistry::get_mut`], but only [`EntityRegistry::add`] and
/// [`EntityRegistry::delete`] change membership and notify subscribers.
pub struct EntityRegistry<T: Entity> {
    name: &'static str,
    entities: HashMap<EntityId, T>,
    order: Vec<EntityId>,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<RegistryEvent<T::State>>)>,
    next_subscription: u64,
}

impl<T: Entity> EntityRegistry<T> {
    /// Creates an empty registry with no subscribers
    ///
    /// The name only appears in log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entities: HashMap::new(),
            order: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Looks up a member by id
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)
    }

    /// Mutable access to a member's fields
    ///
    /// Membership stays untouched and nothing is published. Callers that
    /// change mirrored fields follow up with
    /// [`EntityRegistry::notify_updated`].
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Members in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Mutable access to every member, in no particular order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entities.values_mut()
    }

    /// Inserts entities whose id is not present yet
    ///
    /// Entities with an id already in the registry are skipped. Subscribers
    /// receive a single `Added` event listing the inserted states, and
    /// nothing at all when every entity was skipped. Returns the ids
    /// actually inserted.
    pub fn add(&mut self, entities: impl IntoIterator<Item = T>) -> Vec<EntityId> {
        let mut added = Vec::new();
        let mut states = Vec::new();

        for entity in entities {
            let id = entity.id();
            if self.entities.contains_key(&id) {
                continue;
            }
            states.push(entity.state());
            self.entities.insert(id, entity);
            self.order.push(id);
            added.push(id);
        }

        if !states.is_empty() {
            self.emit(RegistryEvent::Added(states));
        }
        added
    }

    /// Removes the given ids and returns the entities actually removed
    ///
    /// Unknown ids are ignored. Subscribers receive one `Deleted` event with
    /// the removed ids, or nothing when no id matched.
    pub fn delete(&mut self, ids: impl IntoIterator<Item = EntityId>) -> Vec<T> {
        let mut removed = Vec::new();
        for id in ids {
            if let Some(entity) = self.entities.remove(&id) {
                removed.push(entity);
            }
        }

        if !removed.is_empty() {
            self.order.retain(|id| self.entities.contains_key(id));
            self.emit(RegistryEvent::Deleted(
                removed.iter().map(Entity::id).collect(),
            ));
        }
        removed
    }

    /// Publishes the current state of members whose fields changed
    ///
    /// Duplicate and unknown ids are dropped. The event keeps the order in
    /// which ids were first given.
    pub fn notify_updated(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        let mut states = Vec::new();
        let mut seen = Vec::new();
        for id in ids {
            if seen.contains(&id) {
                continue;
            }
            if let Some(entity) = self.entities.get(&id) {
                states.push(entity.state());
                seen.push(id);
            }
        }

        if !states.is_empty() {
            self.emit(RegistryEvent::Updated(states));
        }
    }

    /// Serializable states of every member in insertion order
    pub fn state(&self) -> Vec<T::State> {
        self.iter().map(Entity::state).collect()
    }

    /// Opens a new change feed
    ///
    /// The feed sees only changes made after this call. Dropping the
    /// returned subscription detaches it on the next emission.
    pub fn subscribe(&mut self) -> Subscription<T::State> {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.push((id, sender));
        Subscription { id, receiver }
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    fn emit(&mut self, event: RegistryEvent<T::State>) {
        let name = self.name;
        self.subscribers.retain(|(id, sender)| {
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                debug!("Dropping closed {} subscription {:?}", name, id);
            }
            delivered
        });
    }
}
