//! The class/method/field graph query interface and its in-memory implementation.
//!
//! The optimizer never mutates the program graph; it only asks questions about it through
//! [`AppView`]. [`Program`] is a concurrently readable implementation backed by a
//! [`SkipMap`], suitable for embedders that already hold their classes in memory and for
//! tests.

use std::{collections::HashSet, sync::Arc};

use crossbeam_skiplist::SkipMap;
use dashmap::DashSet;

use crate::metadata::{ClassDefinition, MethodDefinition, MethodRef, ProgramItem, Proto, TypeRef};

/// Read-only view of the application's class graph.
///
/// Implementations must be safe to query from many worker threads at once.
pub trait AppView: Send + Sync {
    /// Returns the definition of `ty`, if the program or its libraries define it.
    fn definition_for(&self, ty: &TypeRef) -> Option<Arc<ClassDefinition>>;

    /// Returns `true` if instantiating `ty` could run a static initializer anywhere in its
    /// supertype and interface chain.
    fn can_trigger_static_initializer(&self, ty: &TypeRef) -> bool;

    /// Returns `true` if `item` must be kept exactly as it is.
    fn is_pinned(&self, item: &ProgramItem) -> bool;

    /// The universal root type every class ultimately extends.
    fn root_type(&self) -> TypeRef {
        TypeRef::object()
    }

    /// Looks up the definition of a method on exactly its holder.
    fn method_definition(&self, method: &MethodRef) -> Option<Arc<MethodDefinition>> {
        self.definition_for(&method.holder)?
            .lookup_method(method)
            .cloned()
    }

    /// Resolves the method a virtual call on an object of exact type `ty` dispatches to.
    ///
    /// Walks the superclass chain starting at `ty` and returns the first concrete instance
    /// method matching `name` and `proto`.
    fn resolve_exact_virtual(
        &self,
        ty: &TypeRef,
        name: &str,
        proto: &Proto,
    ) -> Option<Arc<MethodDefinition>> {
        let mut current = Some(ty.clone());
        let mut visited = HashSet::new();
        while let Some(ty) = current {
            if !visited.insert(ty.clone()) {
                return None;
            }
            let class = self.definition_for(&ty)?;
            if let Some(method) = class.lookup_virtual(name, proto) {
                return Some(method.clone());
            }
            current = class.superclass.clone();
        }
        None
    }
}

/// In-memory program graph.
///
/// # Examples
///
/// ```rust,ignore
/// use cfopt::metadata::{ClassBuilder, Program, TypeRef};
///
/// let program = Program::new();
/// program.add_class(ClassBuilder::new(TypeRef::class("L")).build());
/// assert!(program.definition_for(&TypeRef::class("L")).is_some());
/// ```
#[derive(Default)]
pub struct Program {
    classes: SkipMap<TypeRef, Arc<ClassDefinition>>,
    pinned: DashSet<ProgramItem>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a class.
    pub fn add_class(&self, class: ClassDefinition) -> Arc<ClassDefinition> {
        let class = Arc::new(class);
        self.classes.insert(class.ty.clone(), class.clone());
        class
    }

    /// Marks an item as pinned.
    pub fn pin(&self, item: ProgramItem) {
        self.pinned.insert(item);
    }

    /// Number of classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// All classes, ordered by type.
    #[must_use]
    pub fn classes(&self) -> Vec<Arc<ClassDefinition>> {
        self.classes.iter().map(|e| e.value().clone()).collect()
    }

    /// Every method that carries a body.
    #[must_use]
    pub fn methods_with_code(&self) -> Vec<Arc<MethodDefinition>> {
        self.classes
            .iter()
            .flat_map(|e| {
                e.value()
                    .methods
                    .iter()
                    .filter(|m| m.code.is_some())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl AppView for Program {
    fn definition_for(&self, ty: &TypeRef) -> Option<Arc<ClassDefinition>> {
        self.classes.get(ty).map(|e| e.value().clone())
    }

    fn can_trigger_static_initializer(&self, ty: &TypeRef) -> bool {
        let root = self.root_type();
        let mut worklist = vec![ty.clone()];
        let mut visited = HashSet::new();

        while let Some(current) = worklist.pop() {
            if current == root || !visited.insert(current.clone()) {
                continue;
            }
            // Unknown supertypes may initialize anything.
            let Some(class) = self.definition_for(&current) else {
                return true;
            };
            if class.has_class_initializer() {
                return true;
            }
            worklist.extend(class.superclass.iter().cloned());
            worklist.extend(class.interfaces.iter().cloned());
        }
        false
    }

    fn is_pinned(&self, item: &ProgramItem) -> bool {
        self.pinned.contains(item)
    }
}
