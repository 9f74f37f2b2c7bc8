/// Page size requested for list resources; large enough to get everything in one page
pub const LIST_LIMIT: u32 = 10000;

/// A remote document, addressed relative to the API base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Pokemon(String),
    Species(String),
    Type(String),
    EvolutionChain(u32),
    TypeList,
    SpeciesList,
    /// Absolute URL of a follow-up list page
    Page(String),
}

impl Resource {
    pub fn pokemon(id_or_name: impl ToString) -> Self {
        Resource::Pokemon(id_or_name.to_string())
    }

    pub fn species(id_or_name: impl ToString) -> Self {
        Resource::Species(id_or_name.to_string())
    }

    pub fn type_named(name: impl ToString) -> Self {
        Resource::Type(name.to_string())
    }

    /// Path relative to the base URL. Doubles as the cache key.
    pub fn path(&self) -> String {
        match self {
            Resource::Pokemon(key) => format!("pokemon/{}", key),
            Resource::Species(key) => format!("pokemon-species/{}", key),
            Resource::Type(name) => format!("type/{}", name),
            Resource::EvolutionChain(id) => format!("evolution-chain/{}", id),
            Resource::TypeList => format!("type?limit={}", LIST_LIMIT),
            Resource::SpeciesList => format!("pokemon-species?limit={}", LIST_LIMIT),
            Resource::Page(url) => url.clone(),
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        match self {
            Resource::Page(url) => url.clone(),
            other => format!("{}/{}", base_url.trim_end_matches('/'), other.path()),
        }
    }
}

/// Numeric id from the trailing segment of a resource URL,
/// e.g. `.../evolution-chain/10/` -> 10
pub fn id_from_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}
