//! A single renaming layer.

use std::{collections::HashMap, sync::Arc};

use crate::{
    lens::LensId,
    metadata::{FieldRef, InvokeKind, MethodRef, Proto, TypeRef},
};

/// Where a renamed method now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMapping {
    /// The new identity
    pub target: MethodRef,
    /// Replacement invoke kind; `None` keeps the caller's kind
    pub kind: Option<InvokeKind>,
}

/// The outcome of a method lookup: the current identity and how to invoke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLookup {
    /// Current identity
    pub reference: MethodRef,
    /// Invoke kind to use for the current identity
    pub kind: InvokeKind,
}

/// An immutable set of renames introduced by one pass, on top of its parent layer.
///
/// Type renames apply structurally: an unmapped method or field whose holder, parameter,
/// return or field type is a renamed type is rewritten accordingly.
#[derive(Debug, Clone, Default)]
pub struct LensLayer {
    parent: Option<LensId>,
    name: Arc<str>,
    methods: HashMap<MethodRef, MethodMapping>,
    fields: HashMap<FieldRef, FieldRef>,
    types: HashMap<TypeRef, TypeRef>,
}

impl LensLayer {
    /// Starts a layer named after the pass that creates it.
    #[must_use]
    pub fn builder(name: &str) -> LensLayerBuilder {
        LensLayerBuilder {
            layer: LensLayer {
                name: Arc::from(name),
                ..LensLayer::default()
            },
        }
    }

    /// The layer this one was built on.
    #[must_use]
    pub fn parent(&self) -> Option<LensId> {
        self.parent
    }

    /// Name of the pass that created the layer.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the layer renames nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.fields.is_empty() && self.types.is_empty()
    }

    /// Number of explicit renames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len() + self.fields.len() + self.types.len()
    }

    /// The explicit mapping of `method`, if any.
    #[must_use]
    pub fn method_mapping(&self, method: &MethodRef) -> Option<&MethodMapping> {
        self.methods.get(method)
    }

    /// Applies this layer alone to a method reference.
    ///
    /// A mapping is not applied when the querying `context` is the mapping's source or
    /// target, so a forwarding method keeps calling what it called.
    #[must_use]
    pub fn map_method(
        &self,
        method: &MethodRef,
        context: &MethodRef,
        kind: InvokeKind,
    ) -> MethodLookup {
        if let Some(mapping) = self.methods.get(method) {
            if context != method && *context != mapping.target {
                return MethodLookup {
                    reference: mapping.target.clone(),
                    kind: mapping.kind.unwrap_or(kind),
                };
            }
        }
        MethodLookup {
            reference: self.rewrite_method_types(method),
            kind,
        }
    }

    /// Applies this layer alone to a field reference.
    #[must_use]
    pub fn map_field(&self, field: &FieldRef) -> FieldRef {
        if let Some(target) = self.fields.get(field) {
            return target.clone();
        }
        if self.types.is_empty() {
            return field.clone();
        }
        FieldRef::new(
            self.map_type(&field.holder),
            field.name.clone(),
            self.map_type(&field.ty),
        )
    }

    /// Applies this layer alone to a type reference; array element types are mapped too.
    #[must_use]
    pub fn map_type(&self, ty: &TypeRef) -> TypeRef {
        if let Some(target) = self.types.get(ty) {
            return target.clone();
        }
        match ty.element_type() {
            Some(element) if !self.types.is_empty() => {
                let mapped = self.map_type(&element);
                if mapped == element {
                    ty.clone()
                } else {
                    TypeRef::new(format!("[{}", mapped.descriptor()))
                }
            }
            _ => ty.clone(),
        }
    }

    fn rewrite_method_types(&self, method: &MethodRef) -> MethodRef {
        if self.types.is_empty() {
            return method.clone();
        }
        let proto = Proto::new(
            self.map_type(&method.proto.ret),
            method.proto.params.iter().map(|p| self.map_type(p)).collect(),
        );
        MethodRef::new(self.map_type(&method.holder), method.name.clone(), proto)
    }
}

/// Accumulates renames for a new [`LensLayer`].
#[derive(Debug, Clone)]
pub struct LensLayerBuilder {
    layer: LensLayer,
}

impl LensLayerBuilder {
    /// Renames `from` to `to`, keeping the caller's invoke kind.
    #[must_use]
    pub fn map_method(mut self, from: MethodRef, to: MethodRef) -> Self {
        self.layer.methods.insert(
            from,
            MethodMapping {
                target: to,
                kind: None,
            },
        );
        self
    }

    /// Renames `from` to `to`, invoked with `kind` from now on.
    #[must_use]
    pub fn map_method_with_kind(mut self, from: MethodRef, to: MethodRef, kind: InvokeKind) -> Self {
        self.layer.methods.insert(
            from,
            MethodMapping {
                target: to,
                kind: Some(kind),
            },
        );
        self
    }

    /// Renames a field.
    #[must_use]
    pub fn map_field(mut self, from: FieldRef, to: FieldRef) -> Self {
        self.layer.fields.insert(from, to);
        self
    }

    /// Renames a type.
    #[must_use]
    pub fn map_type(mut self, from: TypeRef, to: TypeRef) -> Self {
        self.layer.types.insert(from, to);
        self
    }

    /// Returns `true` if nothing has been mapped yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layer.is_empty()
    }

    /// Finishes the layer on top of `parent` (`None` for the root).
    #[must_use]
    pub fn build(mut self, parent: Option<LensId>) -> LensLayer {
        self.layer.parent = parent;
        self.layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(holder: &str, name: &str) -> MethodRef {
        MethodRef::new(TypeRef::class(holder), name, Proto::new(TypeRef::void(), vec![]))
    }

    #[test]
    fn test_context_suppresses_mapping() {
        let layer = LensLayer::builder("bridges")
            .map_method(m("A", "bridge"), m("A", "target"))
            .build(None);
        let caller = m("B", "caller");

        let hit = layer.map_method(&m("A", "bridge"), &caller, InvokeKind::Virtual);
        assert_eq!(hit.reference, m("A", "target"));
        assert_eq!(hit.kind, InvokeKind::Virtual);

        let own = layer.map_method(&m("A", "bridge"), &m("A", "bridge"), InvokeKind::Virtual);
        assert_eq!(own.reference, m("A", "bridge"));
        let from_target = layer.map_method(&m("A", "bridge"), &m("A", "target"), InvokeKind::Virtual);
        assert_eq!(from_target.reference, m("A", "bridge"));
    }

    #[test]
    fn test_type_rename_is_structural() {
        let layer = LensLayer::builder("types")
            .map_type(TypeRef::class("Old"), TypeRef::class("New"))
            .build(None);
        let field = FieldRef::new(TypeRef::class("Holder"), "f", TypeRef::new("[LOld;"));
        assert_eq!(layer.map_field(&field).ty, TypeRef::new("[LNew;"));

        let method = m("Old", "run");
        let mapped = layer.map_method(&method, &m("X", "y"), InvokeKind::Static);
        assert_eq!(mapped.reference.holder, TypeRef::class("New"));
        assert_eq!(layer.len(), 1);
    }
}
