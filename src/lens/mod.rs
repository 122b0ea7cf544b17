//! Reference lens chain: composable renaming of methods, fields and types.
//!
//! Passes that rename program items (for example forwarding calls of a bridge method to
//! its target) do not rewrite code that has already been lowered. Instead each such pass
//! publishes one immutable [`LensLayer`] on top of the previous one, and later consumers ask
//! the chain for the *current* name of a reference they read from older code.
//!
//! # Architecture
//!
//! - [`LensChain`] - append-only arena of layers; a layer refers to its parent by
//!   [`LensId`], so older layers are shared by every newer one and cycles cannot form
//! - [`LensLayer`] / [`LensLayerBuilder`] - the renames introduced by one pass
//! - [`LensView`] - the precomputed path between two layers, used for lookups
//!
//! Code remembers the lens it was written against (`MethodCode::lens`). Lifting maps every
//! reference through the view from that lens to the current one, applying the layers from
//! oldest to newest.
//!
//! # Thread Safety
//!
//! Layers never change after [`LensChain::push`]. The arena is a `boxcar::Vec`, so pushes and
//! lookups from many worker threads need no locking.
//!
//! # Examples
//!
//! ```rust,ignore
//! use cfopt::lens::{LensChain, LensLayer};
//!
//! let chain = LensChain::new();
//! let id = chain.push(LensLayer::builder("bridges").map_method(bridge, target).build(None))?;
//! let view = chain.view(None, Some(id))?;
//! assert_eq!(view.lookup_method(&bridge, &caller, InvokeKind::Virtual).reference, target);
//! ```

mod layer;
mod view;

use std::fmt;

pub use layer::{LensLayer, LensLayerBuilder, MethodLookup, MethodMapping};
pub use view::LensView;

use crate::{Error, Result};

/// Identifier of a layer in a [`LensChain`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LensId(usize);

impl LensId {
    /// Creates an identifier from its arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        LensId(index)
    }

    /// The arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LensId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lens#{}", self.0)
    }
}

impl fmt::Display for LensId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lens#{}", self.0)
    }
}

/// Append-only arena of immutable lens layers.
pub struct LensChain {
    layers: boxcar::Vec<LensLayer>,
}

impl LensChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        LensChain {
            layers: boxcar::Vec::new(),
        }
    }

    /// Publishes `layer` and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLens`] if the layer's parent is not in this chain.
    pub fn push(&self, layer: LensLayer) -> Result<LensId> {
        if let Some(parent) = layer.parent() {
            if self.layers.get(parent.index()).is_none() {
                return Err(Error::InvalidLens(format!(
                    "parent {parent} of layer '{}' does not exist",
                    layer.name()
                )));
            }
        }
        Ok(LensId(self.layers.push(layer)))
    }

    /// A layer by identifier.
    #[must_use]
    pub fn get(&self, id: LensId) -> Option<&LensLayer> {
        self.layers.get(id.index())
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.count()
    }

    /// Returns `true` if no layer has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.count() == 0
    }

    /// The layers strictly after `from` up to and including `to`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLens`] if either identifier is unknown or `from` is not an
    /// ancestor of `to`.
    pub fn path(&self, from: Option<LensId>, to: Option<LensId>) -> Result<Vec<LensId>> {
        if let Some(from) = from {
            if self.get(from).is_none() {
                return Err(Error::InvalidLens(format!("{from} does not exist")));
            }
        }

        let mut path = Vec::new();
        let mut current = to;
        while current != from {
            let Some(id) = current else {
                return Err(Error::InvalidLens(format!(
                    "{} is not an ancestor of {}",
                    display(from),
                    display(to)
                )));
            };
            let layer = self
                .get(id)
                .ok_or_else(|| Error::InvalidLens(format!("{id} does not exist")))?;
            path.push(id);
            current = layer.parent();
        }
        path.reverse();
        Ok(path)
    }

    /// A view translating references written against `from` into `to`.
    ///
    /// # Errors
    ///
    /// See [`LensChain::path`].
    pub fn view(&self, from: Option<LensId>, to: Option<LensId>) -> Result<LensView<'_>> {
        Ok(LensView::new(self, self.path(from, to)?, to))
    }
}

impl Default for LensChain {
    fn default() -> Self {
        LensChain::new()
    }
}

impl fmt::Debug for LensChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|(i, layer)| (i, layer.name())))
            .finish()
    }
}

fn display(id: Option<LensId>) -> String {
    id.map_or_else(|| "root".to_string(), |id| id.to_string())
}
