//! Integration tests for the reference lens chain.

use cfopt::prelude::*;

fn m(holder: &str, name: &str) -> MethodRef {
    MethodRef::new(
        TypeRef::class(holder),
        name,
        Proto::new(TypeRef::int(), vec![]),
    )
}

fn caller() -> MethodRef {
    m("Main", "main")
}

/// Pushes `count` layers that rename unrelated methods, each on top of the previous one.
fn unrelated_layers(chain: &LensChain, count: usize) -> Result<Option<LensId>> {
    let mut top = None;
    for i in 0..count {
        let layer = LensLayer::builder(&format!("noise{i}"))
            .map_method(m("Noise", &format!("f{i}")), m("Noise", &format!("g{i}")))
            .build(top);
        top = Some(chain.push(layer)?);
    }
    Ok(top)
}

#[test]
fn test_only_the_top_layer_renames() -> Result<()> {
    let a = m("A", "a");
    let b = m("B", "b");

    let chain = LensChain::new();
    let below = unrelated_layers(&chain, 5)?;
    let top = chain.push(
        LensLayer::builder("top")
            .map_method(a.clone(), b.clone())
            .build(below),
    )?;
    assert_eq!(chain.len(), 6);

    let full = chain.view(None, Some(top))?;
    assert_eq!(full.path().len(), 6);
    assert_eq!(
        full.lookup_method(&a, &caller(), InvokeKind::Virtual).reference,
        b
    );

    // Stopping one layer short leaves the reference alone.
    let partial = chain.view(None, below)?;
    assert_eq!(
        partial.lookup_method(&a, &caller(), InvokeKind::Virtual).reference,
        a
    );

    // Code already written against `below` only needs the top layer.
    let incremental = chain.view(below, Some(top))?;
    assert_eq!(incremental.path(), &[top]);
    assert_eq!(
        incremental
            .lookup_method(&a, &caller(), InvokeKind::Virtual)
            .reference,
        b
    );
    Ok(())
}

#[test]
fn test_renames_compose_oldest_first() -> Result<()> {
    let a = m("A", "a");
    let b = m("B", "b");
    let c = m("C", "c");

    let chain = LensChain::new();
    let first = chain.push(LensLayer::builder("first").map_method(a.clone(), b.clone()).build(None))?;
    let second = chain.push(
        LensLayer::builder("second")
            .map_method_with_kind(b.clone(), c.clone(), InvokeKind::Interface)
            .build(Some(first)),
    )?;

    let lookup = chain
        .view(None, Some(second))?
        .lookup_method(&a, &caller(), InvokeKind::Virtual);
    assert_eq!(lookup.reference, c);
    assert_eq!(lookup.kind, InvokeKind::Interface);

    // Without a kind override the caller's kind is kept.
    let lookup = chain
        .view(None, Some(first))?
        .lookup_method(&a, &caller(), InvokeKind::Static);
    assert_eq!(lookup.kind, InvokeKind::Static);
    Ok(())
}

#[test]
fn test_mapping_is_invisible_to_its_own_endpoints() -> Result<()> {
    let bridge = m("A", "bridge");
    let target = m("A", "target");

    let chain = LensChain::new();
    let id = chain.push(
        LensLayer::builder("bridges")
            .map_method(bridge.clone(), target.clone())
            .build(None),
    )?;
    let view = chain.view(None, Some(id))?;

    assert_eq!(
        view.lookup_method(&bridge, &target, InvokeKind::Virtual).reference,
        bridge
    );
    assert_eq!(
        view.lookup_method(&bridge, &bridge, InvokeKind::Virtual).reference,
        bridge
    );
    assert_eq!(
        view.lookup_method(&bridge, &caller(), InvokeKind::Virtual).reference,
        target
    );
    Ok(())
}

#[test]
fn test_type_renames_apply_to_signatures() -> Result<()> {
    let old = TypeRef::class("Old");
    let new = TypeRef::class("New");
    let method = MethodRef::new(
        TypeRef::class("User"),
        "take",
        Proto::new(old.clone(), vec![old.clone(), TypeRef::int()]),
    );
    let field = FieldRef::new(old.clone(), "value", old.clone());

    let chain = LensChain::new();
    let id = chain.push(LensLayer::builder("types").map_type(old, new.clone()).build(None))?;
    let view = chain.view(None, Some(id))?;

    let renamed = view
        .lookup_method(&method, &caller(), InvokeKind::Static)
        .reference;
    assert_eq!(renamed.holder, TypeRef::class("User"));
    assert_eq!(
        renamed.proto,
        Proto::new(new.clone(), vec![new.clone(), TypeRef::int()])
    );
    assert_eq!(view.lookup_field(&field), FieldRef::new(new.clone(), "value", new));
    Ok(())
}

#[test]
fn test_unrelated_views_are_rejected() -> Result<()> {
    let chain = LensChain::new();
    let left = chain.push(LensLayer::builder("left").build(None))?;
    let right = chain.push(LensLayer::builder("right").build(None))?;

    assert!(matches!(
        chain.view(Some(left), Some(right)),
        Err(Error::InvalidLens(_))
    ));
    assert!(LensView::identity().is_identity());
    Ok(())
}

#[test]
fn test_layers_can_be_pushed_from_many_threads() -> Result<()> {
    let chain = LensChain::new();
    let root = chain.push(LensLayer::builder("root").build(None))?;

    std::thread::scope(|scope| {
        for i in 0..8 {
            let chain = &chain;
            scope.spawn(move || {
                chain
                    .push(
                        LensLayer::builder(&format!("worker{i}"))
                            .map_method(m("W", &format!("f{i}")), m("W", &format!("g{i}")))
                            .build(Some(root)),
                    )
                    .expect("parent exists");
            });
        }
    });

    assert_eq!(chain.len(), 9);
    Ok(())
}
