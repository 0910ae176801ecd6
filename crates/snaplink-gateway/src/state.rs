use std::sync::Arc;

use snaplink_core::{LinkCache, Repository};
use snaplink_generator::RandomGenerator;
use snaplink_resolver::{ResolutionEngine, ResolverSettings};
use snaplink_shortener::{AllocatorSettings, LinkService};

pub type SharedLinkService = LinkService<dyn Repository, dyn LinkCache, RandomGenerator>;
pub type SharedResolver = ResolutionEngine<dyn Repository, dyn LinkCache>;

#[derive(Clone)]
pub struct AppState {
    links: Arc<SharedLinkService>,
    resolver: Arc<SharedResolver>,
    base_url: String,
}

impl AppState {
    pub fn new(
        links: Arc<SharedLinkService>,
        resolver: Arc<SharedResolver>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            links,
            resolver,
            base_url: public_base_url.into(),
        }
    }

    /// Builds both services over one store and one cache.
    pub fn from_backends(
        repository: Arc<dyn Repository>,
        cache: Arc<dyn LinkCache>,
        generator: RandomGenerator,
        allocator: AllocatorSettings,
        resolver: ResolverSettings,
        public_base_url: impl Into<String>,
    ) -> Self {
        let links = LinkService::new(repository.clone(), cache.clone(), generator, allocator);
        let resolver = ResolutionEngine::new(repository, cache, resolver);
        Self::new(Arc::new(links), Arc::new(resolver), public_base_url)
    }

    pub fn links(&self) -> &SharedLinkService {
        &self.links
    }

    pub fn resolver(&self) -> &SharedResolver {
        &self.resolver
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
