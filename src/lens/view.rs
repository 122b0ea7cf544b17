//! Lookups through a path of lens layers.

use crate::{
    lens::{LensChain, LensId, MethodLookup},
    metadata::{FieldRef, InvokeKind, MethodRef, TypeRef},
};

/// Translates references written against one layer into the names of a newer layer.
///
/// Each layer on the path is applied to the result of the previous one, oldest first.
/// The empty view is the identity.
#[derive(Debug, Clone)]
pub struct LensView<'a> {
    chain: Option<&'a LensChain>,
    path: Vec<LensId>,
    target: Option<LensId>,
}

impl<'a> LensView<'a> {
    pub(crate) fn new(chain: &'a LensChain, path: Vec<LensId>, target: Option<LensId>) -> Self {
        LensView {
            chain: Some(chain),
            path,
            target,
        }
    }

    /// A view that maps every reference to itself.
    #[must_use]
    pub fn identity() -> Self {
        LensView {
            chain: None,
            path: Vec::new(),
            target: None,
        }
    }

    /// The layer references are translated into; `None` for the identity view and for
    /// views ending at the root.
    #[must_use]
    pub fn target(&self) -> Option<LensId> {
        self.target
    }

    /// Returns `true` if no layer lies on the path.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.path.is_empty()
    }

    /// The layers applied, oldest first.
    #[must_use]
    pub fn path(&self) -> &[LensId] {
        &self.path
    }

    fn layers(&self) -> impl Iterator<Item = &'a crate::lens::LensLayer> + '_ {
        let chain = self.chain;
        self.path
            .iter()
            .filter_map(move |&id| chain.and_then(|c| c.get(id)))
    }

    /// The current identity of `method` and the invoke kind to use for it, as seen from
    /// the method `context` performing the call.
    #[must_use]
    pub fn lookup_method(
        &self,
        method: &MethodRef,
        context: &MethodRef,
        kind: InvokeKind,
    ) -> MethodLookup {
        let mut current = MethodLookup {
            reference: method.clone(),
            kind,
        };
        for layer in self.layers() {
            current = layer.map_method(&current.reference, context, current.kind);
        }
        current
    }

    /// The current identity of `field`.
    #[must_use]
    pub fn lookup_field(&self, field: &FieldRef) -> FieldRef {
        self.layers()
            .fold(field.clone(), |current, layer| layer.map_field(&current))
    }

    /// The current identity of `ty`.
    #[must_use]
    pub fn lookup_type(&self, ty: &TypeRef) -> TypeRef {
        self.layers()
            .fold(ty.clone(), |current, layer| layer.map_type(&current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lens::LensLayer,
        metadata::{InvokeKind, Proto},
    };

    fn m(name: &str) -> MethodRef {
        MethodRef::new(TypeRef::class("A"), name, Proto::new(TypeRef::void(), vec![]))
    }

    #[test]
    fn test_layers_compose_oldest_first() {
        let chain = LensChain::new();
        let first = chain
            .push(LensLayer::builder("first").map_method(m("a"), m("b")).build(None))
            .unwrap();
        let second = chain
            .push(
                LensLayer::builder("second")
                    .map_method_with_kind(m("b"), m("c"), InvokeKind::Static)
                    .build(Some(first)),
            )
            .unwrap();

        let caller = MethodRef::new(TypeRef::class("Z"), "z", Proto::new(TypeRef::void(), vec![]));
        let view = chain.view(None, Some(second)).unwrap();
        let result = view.lookup_method(&m("a"), &caller, InvokeKind::Virtual);
        assert_eq!(result.reference, m("c"));
        assert_eq!(result.kind, InvokeKind::Static);

        let partial = chain.view(Some(first), Some(second)).unwrap();
        assert_eq!(
            partial.lookup_method(&m("a"), &caller, InvokeKind::Virtual).reference,
            m("a")
        );
        assert_eq!(partial.target(), Some(second));
        assert!(LensView::identity().is_identity());
        assert_eq!(LensView::identity().target(), None);
    }
}
