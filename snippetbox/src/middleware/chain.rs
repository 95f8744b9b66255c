//! Ordered composition of middleware stages
//!
//! A [`Chain`] is a `tower` layer built from named stages. The first stage
//! added is the outermost wrapper: for stages `A`, `B`, `C` around handler
//! `H` the call order is `A`, `B`, `C`, `H`, then back out `C`, `B`, `A`.

use tower::layer::util::{Identity, Stack};
use tower::Layer;

/// A named middleware stage
pub trait Stage {
    /// Short name used in logs and introspection
    fn name(&self) -> &'static str;
}

/// Order-preserving stack of stages
#[derive(Debug, Clone)]
pub struct Chain<L> {
    layers: L,
    names: Vec<&'static str>,
}

impl Default for Chain<Identity> {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain<Identity> {
    /// Empty chain; wrapping a service with it changes nothing
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Identity::new(),
            names: Vec::new(),
        }
    }
}

impl<L> Chain<L> {
    /// Add `stage` inside every stage already in the chain
    #[must_use]
    pub fn then<T: Stage>(self, stage: T) -> Chain<Stack<T, L>> {
        let mut names = self.names;
        names.push(stage.name());
        Chain {
            layers: Stack::new(stage, self.layers),
            names,
        }
    }

    /// Run every stage of `other` inside this chain's stages
    #[must_use]
    pub fn append<M>(self, other: Chain<M>) -> Chain<Stack<M, L>> {
        let mut names = self.names;
        names.extend(other.names);
        Chain {
            layers: Stack::new(other.layers, self.layers),
            names,
        }
    }

    /// Stage names, outermost first
    #[must_use]
    pub fn stage_names(&self) -> &[&'static str] {
        &self.names
    }
}

impl<S, L: Layer<S>> Layer<S> for Chain<L> {
    type Service = L::Service;

    fn layer(&self, inner: S) -> Self::Service {
        self.layers.layer(inner)
    }
}
