//! Schema version hashing.

use sha2::{Digest, Sha256};

/// Computes the schema version of a bundle from its field names.
///
/// The hash is independent of field order, so two sites with the same field
/// set agree on the version regardless of how their fields were declared.
pub fn schema_version<I, S>(entity_type: &str, bundle: &str, fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = fields.into_iter().map(|f| f.as_ref().to_owned()).collect();
    names.sort();
    names.dedup();

    let mut hasher = Sha256::new();
    hasher.update(entity_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(bundle.as_bytes());
    for name in &names {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_matter() {
        let a = schema_version("node", "article", ["title", "body"]);
        let b = schema_version("node", "article", ["body", "title"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn bundle_is_part_of_the_hash() {
        let a = schema_version("node", "article", ["title"]);
        let b = schema_version("node", "page", ["title"]);
        assert_ne!(a, b);
    }

    #[test]
    fn added_field_changes_version() {
        let a = schema_version("node", "article", ["title"]);
        let b = schema_version("node", "article", ["title", "field_tags"]);
        assert_ne!(a, b);
    }
}
