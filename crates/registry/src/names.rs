//! Node type naming conventions.

use heck::ToKebabCase;

/// Derives the external kebab-case node type from an implementation's
/// class name: a trailing `Node` suffix is stripped and capital
/// transitions become hyphens, so `ReadFileNode` maps to `read-file`.
pub fn node_type_from_class_name(class_name: &str) -> String {
    let trimmed = class_name.strip_suffix("Node").unwrap_or(class_name);
    trimmed.to_kebab_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_node_suffix_and_hyphenates() {
        assert_eq!(node_type_from_class_name("ReadFileNode"), "read-file");
        assert_eq!(node_type_from_class_name("ShellNode"), "shell");
        assert_eq!(node_type_from_class_name("LlmNode"), "llm");
        assert_eq!(node_type_from_class_name("HttpRequestNode"), "http-request");
    }

    #[test]
    fn leaves_suffixless_names_alone() {
        assert_eq!(node_type_from_class_name("Transform"), "transform");
    }
}
