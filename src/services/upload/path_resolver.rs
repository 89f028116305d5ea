/// Absolute logical destination handed to the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    pub absolute_path: String,
}

/// Prefixes the user's root path onto the requested fragment.
///
/// This is a plain concatenation: no separator is inserted and nothing is
/// normalized, so `"/home/alice"` + `"docs"` gives `"/home/alicedocs"`.
/// Roots are expected to carry their own trailing slash.
pub fn resolve(user_root_path: Option<&str>, requested_fragment: &str) -> ResolvedDestination {
    let absolute_path = match user_root_path {
        Some(root) => format!("{}{}", root, requested_fragment),
        None => requested_fragment.to_string(),
    };
    ResolvedDestination { absolute_path }
}
