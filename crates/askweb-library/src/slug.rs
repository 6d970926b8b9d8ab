//! Notebook id derivation.

/// Normalize a notebook name into its id.
///
/// Letters and digits are lowercased and kept; every run of anything else
/// becomes a single `-`, and leading/trailing dashes are dropped. The result
/// is empty when the name has no alphanumeric characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
