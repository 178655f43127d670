#![forbid(unsafe_code)]

//! Member reflection tables for host objects.
//!
//! Host objects are plain Rust values behind `Rc<RefCell<dyn Any>>`. Their
//! bindable members are declared once with a [`TypeBuilder`] and registered in
//! the thread-local [`TypeRegistry`]. Lookup by name then behaves like runtime
//! reflection: fields, properties and static members are found on the
//! runtime type of the host or on any parent declared with
//! [`TypeBuilder::extends`].
//!
//! # Example
//!
//! ```
//! use bindy_core::reflect::{TypeBuilder, TypeRegistry, MemberKind};
//! use std::any::TypeId;
//!
//! struct Entity { name: String }
//! struct Player { entity: Entity, health: i32 }
//!
//! TypeBuilder::<Entity>::new("Entity")
//!     .field("name", |e: &Entity| e.name.clone(), |e, v| e.name = v)
//!     .register();
//! TypeBuilder::<Player>::new("Player")
//!     .extends::<Entity>(|p| &p.entity, |p| &mut p.entity)
//!     .field("health", |p: &Player| p.health, |p, v| p.health = v)
//!     .register();
//!
//! let member = TypeRegistry::find_member(TypeId::of::<Player>(), "name", MemberKind::Field);
//! assert!(member.is_ok());
//! ```
//!
//! # Invariants
//!
//! 1. Child members shadow parent members with the same name.
//! 2. Flattened member lists are cached per `(type, filter)` and the cache is
//!    dropped whenever a type is registered or [`TypeRegistry::clear_cache`]
//!    runs.
//! 3. Parent chains that loop back on themselves are cut at the first repeat.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};

use crate::error::AccessError;
use crate::value::{BindValue, Value, ValueType};

/// Shared handle to a host object.
pub type HostRef = Rc<RefCell<dyn Any>>;
/// Weak handle to a host object.
pub type WeakHostRef = Weak<RefCell<dyn Any>>;

/// Wrap a value as a [`HostRef`].
#[must_use]
pub fn host<T: Any>(value: T) -> HostRef {
    Rc::new(RefCell::new(value))
}

/// Which kind of member an accessor resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemberKind {
    #[default]
    None,
    Field,
    Property,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "member",
            Self::Field => "field",
            Self::Property => "property",
        })
    }
}

type Getter = Rc<dyn Fn(&dyn Any) -> Option<Value>>;
type Setter = Rc<dyn Fn(&mut dyn Any, Value) -> Result<(), AccessError>>;
type Lift = Rc<dyn Fn(&MemberInfo) -> MemberInfo>;

/// A resolved bindable member with its getter and optional setter.
#[derive(Clone)]
pub struct MemberInfo {
    name: Rc<str>,
    kind: MemberKind,
    value_type: ValueType,
    is_static: bool,
    declaring_type: &'static str,
    getter: Getter,
    setter: Option<Setter>,
}

impl fmt::Debug for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value_type", &self.value_type)
            .field("is_static", &self.is_static)
            .field("declaring_type", &self.declaring_type)
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

impl MemberInfo {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Declared type of the member.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Name of the type that declared the member (a parent for inherited ones).
    #[must_use]
    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Read the member from `host`. `None` if `host` has the wrong type.
    #[must_use]
    pub fn get(&self, host: &dyn Any) -> Option<Value> {
        (self.getter)(host)
    }

    /// Write `value` into the member on `host`.
    ///
    /// # Errors
    ///
    /// [`AccessError::ReadOnly`] without a setter,
    /// [`AccessError::TypeMismatch`] if `value` has the wrong type,
    /// [`AccessError::HostMismatch`] if `host` has the wrong type.
    pub fn set(&self, host: &mut dyn Any, value: Value) -> Result<(), AccessError> {
        match &self.setter {
            Some(setter) => setter(host, value),
            None => Err(AccessError::ReadOnly {
                member: self.name.to_string(),
            }),
        }
    }

    /// Re-root an instance member declared on `P` so it can be read from `H`.
    fn lift<H: Any, P: Any>(
        &self,
        project: fn(&H) -> &P,
        project_mut: fn(&mut H) -> &mut P,
    ) -> MemberInfo {
        if self.is_static {
            return self.clone();
        }
        let get = Rc::clone(&self.getter);
        let getter: Getter = Rc::new(move |host: &dyn Any| {
            let child = host.downcast_ref::<H>()?;
            let parent: &dyn Any = project(child);
            get(parent)
        });
        let setter = self.setter.as_ref().map(|set| {
            let set = Rc::clone(set);
            let declaring_type = self.declaring_type;
            let setter: Setter = Rc::new(move |host: &mut dyn Any, value: Value| {
                let child = host
                    .downcast_mut::<H>()
                    .ok_or(AccessError::HostMismatch {
                        type_name: declaring_type,
                    })?;
                let parent: &mut dyn Any = project_mut(child);
                set(parent, value)
            });
            setter
        });
        MemberInfo {
            getter,
            setter,
            ..self.clone()
        }
    }
}

struct ParentLink {
    type_id: TypeId,
    lift: Lift,
}

/// Reflection table for one host type.
pub struct TypeDescriptor {
    type_id: TypeId,
    name: &'static str,
    members: Vec<MemberInfo>,
    parent: Option<ParentLink>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("members", &self.members.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl TypeDescriptor {
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Members declared directly on this type (no inherited ones).
    #[must_use]
    pub fn own_members(&self) -> &[MemberInfo] {
        &self.members
    }

    /// `TypeId` of the declared parent type, if any.
    #[must_use]
    pub fn parent_type(&self) -> Option<TypeId> {
        self.parent.as_ref().map(|p| p.type_id)
    }
}

/// Declarative builder for a [`TypeDescriptor`].
pub struct TypeBuilder<H> {
    name: &'static str,
    members: Vec<MemberInfo>,
    parent: Option<ParentLink>,
    _host: std::marker::PhantomData<fn(H)>,
}

impl<H: Any> TypeBuilder<H> {
    /// Start describing host type `H` under a display name.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: Vec::new(),
            parent: None,
            _host: std::marker::PhantomData,
        }
    }

    /// Declare a read/write instance field.
    #[must_use]
    pub fn field<T: BindValue>(
        self,
        name: &str,
        get: impl Fn(&H) -> T + 'static,
        set: impl Fn(&mut H, T) + 'static,
    ) -> Self {
        self.instance(name, MemberKind::Field, get, Some(set))
    }

    /// Declare a read/write instance property.
    #[must_use]
    pub fn property<T: BindValue>(
        self,
        name: &str,
        get: impl Fn(&H) -> T + 'static,
        set: impl Fn(&mut H, T) + 'static,
    ) -> Self {
        self.instance(name, MemberKind::Property, get, Some(set))
    }

    /// Declare a property without a setter.
    #[must_use]
    pub fn read_only_property<T: BindValue>(
        self,
        name: &str,
        get: impl Fn(&H) -> T + 'static,
    ) -> Self {
        self.instance::<T, fn(&mut H, T)>(name, MemberKind::Property, get, None)
    }

    /// Declare a static field. The host instance is ignored on access.
    #[must_use]
    pub fn static_field<T: BindValue>(
        self,
        name: &str,
        get: impl Fn() -> T + 'static,
        set: impl Fn(T) + 'static,
    ) -> Self {
        self.statik(name, MemberKind::Field, get, set)
    }

    /// Declare a static property. The host instance is ignored on access.
    #[must_use]
    pub fn static_property<T: BindValue>(
        self,
        name: &str,
        get: impl Fn() -> T + 'static,
        set: impl Fn(T) + 'static,
    ) -> Self {
        self.statik(name, MemberKind::Property, get, set)
    }

    /// Inherit every member registered for `P`, reached through `project`.
    #[must_use]
    pub fn extends<P: Any>(
        mut self,
        project: fn(&H) -> &P,
        project_mut: fn(&mut H) -> &mut P,
    ) -> Self {
        let lift: Lift = Rc::new(move |member: &MemberInfo| member.lift(project, project_mut));
        self.parent = Some(ParentLink {
            type_id: TypeId::of::<P>(),
            lift,
        });
        self
    }

    /// Finish the descriptor without registering it.
    #[must_use]
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            type_id: TypeId::of::<H>(),
            name: self.name,
            members: self.members,
            parent: self.parent,
        }
    }

    /// Finish and register in the thread-local [`TypeRegistry`].
    pub fn register(self) {
        TypeRegistry::register(self.build());
    }

    fn instance<T: BindValue, S: Fn(&mut H, T) + 'static>(
        mut self,
        name: &str,
        kind: MemberKind,
        get: impl Fn(&H) -> T + 'static,
        set: Option<S>,
    ) -> Self {
        let declaring_type = self.name;
        let member_name: Rc<str> = Rc::from(name);
        let getter: Getter =
            Rc::new(move |host: &dyn Any| host.downcast_ref::<H>().map(|h| get(h).into_value()));
        let setter = set.map(|set| {
            let member_name = Rc::clone(&member_name);
            let setter: Setter = Rc::new(move |host: &mut dyn Any, value: Value| {
                let host = host
                    .downcast_mut::<H>()
                    .ok_or(AccessError::HostMismatch {
                        type_name: declaring_type,
                    })?;
                let typed = unwrap_typed::<T>(&member_name, value)?;
                set(host, typed);
                Ok(())
            });
            setter
        });
        self.push(MemberInfo {
            name: member_name,
            kind,
            value_type: T::value_type(),
            is_static: false,
            declaring_type,
            getter,
            setter,
        });
        self
    }

    fn statik<T: BindValue>(
        mut self,
        name: &str,
        kind: MemberKind,
        get: impl Fn() -> T + 'static,
        set: impl Fn(T) + 'static,
    ) -> Self {
        let declaring_type = self.name;
        let member_name: Rc<str> = Rc::from(name);
        let getter: Getter = Rc::new(move |_: &dyn Any| Some(get().into_value()));
        let setter_name = Rc::clone(&member_name);
        let setter: Setter = Rc::new(move |_: &mut dyn Any, value: Value| {
            set(unwrap_typed::<T>(&setter_name, value)?);
            Ok(())
        });
        self.push(MemberInfo {
            name: member_name,
            kind,
            value_type: T::value_type(),
            is_static: true,
            declaring_type,
            getter,
            setter: Some(setter),
        });
        self
    }

    fn push(&mut self, member: MemberInfo) {
        // Redeclaring a name replaces the earlier entry.
        self.members.retain(|m| m.name != member.name);
        self.members.push(member);
    }
}

fn unwrap_typed<T: BindValue>(member: &str, value: Value) -> Result<T, AccessError> {
    let found = value.value_type();
    T::from_value(value).ok_or_else(|| AccessError::TypeMismatch {
        member: member.to_owned(),
        expected: T::value_type(),
        found,
    })
}

type CacheKey = (TypeId, Option<ValueType>);

thread_local! {
    static TYPES: RefCell<AHashMap<TypeId, Rc<TypeDescriptor>>> = RefCell::new(AHashMap::new());
    static MEMBER_CACHE: RefCell<AHashMap<CacheKey, Rc<[MemberInfo]>>> =
        RefCell::new(AHashMap::new());
}

/// Thread-local table of registered host types and the flattened member cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeRegistry;

impl TypeRegistry {
    /// Register (or replace) a type descriptor. Drops the member cache.
    pub fn register(descriptor: TypeDescriptor) {
        tracing::debug!(
            type_name = descriptor.name,
            members = descriptor.members.len(),
            "registered bindable type"
        );
        TYPES.with(|types| {
            types
                .borrow_mut()
                .insert(descriptor.type_id, Rc::new(descriptor));
        });
        Self::clear_cache();
    }

    #[must_use]
    pub fn is_registered(type_id: TypeId) -> bool {
        TYPES.with(|types| types.borrow().contains_key(&type_id))
    }

    #[must_use]
    pub fn descriptor(type_id: TypeId) -> Option<Rc<TypeDescriptor>> {
        TYPES.with(|types| types.borrow().get(&type_id).cloned())
    }

    /// Flattened members of `type_id` (own first, then inherited), optionally
    /// restricted to members whose declared type accepts `filter`.
    ///
    /// Results are cached per `(type_id, filter)`.
    #[must_use]
    pub fn members(type_id: TypeId, filter: Option<ValueType>) -> Option<Rc<[MemberInfo]>> {
        let key = (type_id, filter);
        if let Some(hit) = MEMBER_CACHE.with(|cache| cache.borrow().get(&key).cloned()) {
            return Some(hit);
        }
        let descriptor = Self::descriptor(type_id)?;
        let mut visited = AHashSet::new();
        let all = flatten(&descriptor, &mut visited);
        let members: Rc<[MemberInfo]> = match filter {
            Some(ty) => all
                .into_iter()
                .filter(|m| m.value_type == ty || ty.is_assignable_from(m.value_type))
                .collect(),
            None => all.into(),
        };
        MEMBER_CACHE.with(|cache| cache.borrow_mut().insert(key, Rc::clone(&members)));
        Some(members)
    }

    /// Resolve a member by name and kind on `type_id` or its parents.
    ///
    /// # Errors
    ///
    /// [`AccessError::UnregisteredType`] if the type has no table,
    /// [`AccessError::MemberNotFound`] if no member matches.
    pub fn find_member(
        type_id: TypeId,
        name: &str,
        kind: MemberKind,
    ) -> Result<MemberInfo, AccessError> {
        if kind == MemberKind::None {
            return Err(AccessError::NoMemberKind);
        }
        let members = Self::members(type_id, None).ok_or(AccessError::UnregisteredType { type_id })?;
        members
            .iter()
            .find(|m| m.kind == kind && &*m.name == name)
            .cloned()
            .ok_or_else(|| AccessError::MemberNotFound {
                type_name: Self::descriptor(type_id).map_or("<unknown>", |d| d.name),
                member: name.to_owned(),
                kind,
            })
    }

    /// Number of cached `(type, filter)` entries.
    #[must_use]
    pub fn cached_entries() -> usize {
        MEMBER_CACHE.with(|cache| cache.borrow().len())
    }

    /// Drop the flattened member cache. Registrations are kept.
    pub fn clear_cache() {
        MEMBER_CACHE.with(|cache| cache.borrow_mut().clear());
    }

    /// Drop every registration and the cache.
    pub fn clear() {
        TYPES.with(|types| types.borrow_mut().clear());
        Self::clear_cache();
    }
}

fn flatten(descriptor: &TypeDescriptor, visited: &mut AHashSet<TypeId>) -> Vec<MemberInfo> {
    let mut members = descriptor.members.clone();
    if !visited.insert(descriptor.type_id) {
        return members;
    }
    let Some(link) = &descriptor.parent else {
        return members;
    };
    let Some(parent) = TypeRegistry::descriptor(link.type_id) else {
        tracing::debug!(
            type_name = descriptor.name,
            "parent type is not registered; inherited members skipped"
        );
        return members;
    };
    if visited.contains(&parent.type_id) {
        return members;
    }
    for inherited in flatten(&parent, visited) {
        if members.iter().all(|m| m.name != inherited.name) {
            members.push((link.lift)(&inherited));
        }
    }
    members
}
