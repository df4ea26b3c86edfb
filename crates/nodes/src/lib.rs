//! Built-in node implementations and their registration.
//!
//! Node discovery is an explicit step: [`install`] registers every
//! built-in type with its declared interface into a [`Registry`]. The
//! catalog entries carry constructors, so the compiler can instantiate
//! nodes directly from the registry lookup.

pub mod file;
pub mod http;
pub mod llm;
pub mod shell;

use indexmap::indexmap;

use pflow_registry::{NodeEntry, Registry};
use pflow_types::{NodeBehavior, NodeInterface, PortSpec, StructureField};

pub use file::{ReadFileNode, WriteFileNode};
pub use http::HttpNode;
pub use llm::{LlmCompletion, LlmNode, LlmProvider};
pub use shell::ShellNode;

/// Registers every built-in node type into the registry.
pub fn install(registry: &mut Registry) {
    registry.register(shell_entry());
    registry.register(read_file_entry());
    registry.register(write_file_entry());
    registry.register(http_entry());
    registry.register(llm_entry());
}

/// A registry with all built-in node types installed.
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    install(&mut registry);
    registry
}

fn construct_shell() -> Box<dyn NodeBehavior> {
    Box::new(ShellNode)
}

fn construct_read_file() -> Box<dyn NodeBehavior> {
    Box::new(ReadFileNode)
}

fn construct_write_file() -> Box<dyn NodeBehavior> {
    Box::new(WriteFileNode)
}

fn construct_http() -> Box<dyn NodeBehavior> {
    Box::new(HttpNode)
}

fn construct_llm() -> Box<dyn NodeBehavior> {
    Box::new(LlmNode::unconfigured())
}

fn shell_entry() -> NodeEntry {
    NodeEntry {
        name: "shell".into(),
        module: "pflow_nodes::shell".into(),
        class_name: "ShellNode".into(),
        file_path: "crates/nodes/src/shell.rs".into(),
        description: "Run a shell command and capture stdout, stderr, and the exit code".into(),
        interface: NodeInterface {
            description: "Runs a command through sh -c with optional piped stdin".into(),
            inputs: vec![PortSpec::new("stdin", "str").describe("Data piped to the command")],
            outputs: vec![
                PortSpec::new("stdout", "str").describe("Captured stdout, trailing newlines trimmed"),
                PortSpec::new("stderr", "str").describe("Captured stderr"),
                PortSpec::new("exit_code", "int").describe("Process exit status"),
            ],
            params: vec![
                PortSpec::new("command", "str").describe("Command line to execute"),
                PortSpec::new("timeout", "float").describe("Seconds before the command is killed"),
                PortSpec::new("trim_stdout", "bool")
                    .describe("Strip trailing newlines from stdout (default true)"),
            ],
            actions: vec!["default".into(), "error".into()],
        },
        requires_model: false,
        constructor: Some(construct_shell),
    }
}

fn read_file_entry() -> NodeEntry {
    NodeEntry {
        name: "read-file".into(),
        module: "pflow_nodes::file".into(),
        class_name: "ReadFileNode".into(),
        file_path: "crates/nodes/src/file.rs".into(),
        description: "Read a UTF-8 text file into the shared store".into(),
        interface: NodeInterface {
            description: "Reads a file from disk".into(),
            inputs: vec![],
            outputs: vec![
                PortSpec::new("content", "str").describe("File contents"),
                PortSpec::new("file_path", "str").describe("Path that was read"),
            ],
            params: vec![PortSpec::new("file_path", "str").describe("Path of the file to read")],
            actions: vec!["default".into(), "error".into()],
        },
        requires_model: false,
        constructor: Some(construct_read_file),
    }
}

fn write_file_entry() -> NodeEntry {
    NodeEntry {
        name: "write-file".into(),
        module: "pflow_nodes::file".into(),
        class_name: "WriteFileNode".into(),
        file_path: "crates/nodes/src/file.rs".into(),
        description: "Write content to a file, creating parent directories".into(),
        interface: NodeInterface {
            description: "Writes text or serialized JSON to disk".into(),
            inputs: vec![],
            outputs: vec![
                PortSpec::new("file_path", "str").describe("Path that was written"),
                PortSpec::new("bytes_written", "int").describe("Number of bytes written"),
            ],
            params: vec![
                PortSpec::new("file_path", "str").describe("Destination path"),
                PortSpec::new("content", "str").describe("Content to write"),
            ],
            actions: vec!["default".into(), "error".into()],
        },
        requires_model: false,
        constructor: Some(construct_write_file),
    }
}

fn http_entry() -> NodeEntry {
    NodeEntry {
        name: "http".into(),
        module: "pflow_nodes::http".into(),
        class_name: "HttpNode".into(),
        file_path: "crates/nodes/src/http.rs".into(),
        description: "Issue an HTTP request and capture the response".into(),
        interface: NodeInterface {
            description: "Sends an HTTP request with optional headers and JSON body".into(),
            inputs: vec![],
            outputs: vec![
                PortSpec::new("response", "any").describe("Response body, JSON-parsed when possible"),
                PortSpec::new("status_code", "int").describe("HTTP status code"),
            ],
            params: vec![
                PortSpec::new("url", "str").describe("Request URL"),
                PortSpec::new("method", "str").describe("HTTP method (default GET)"),
                PortSpec::new("headers", "dict").describe("Request headers"),
                PortSpec::new("body", "any").describe("JSON request body"),
                PortSpec::new("timeout", "float").describe("Request timeout in seconds"),
            ],
            actions: vec!["default".into(), "error".into()],
        },
        requires_model: false,
        constructor: Some(construct_http),
    }
}

fn llm_entry() -> NodeEntry {
    NodeEntry {
        name: "llm".into(),
        module: "pflow_nodes::llm".into(),
        class_name: "LlmNode".into(),
        file_path: "crates/nodes/src/llm.rs".into(),
        description: "Invoke a language model with a prompt".into(),
        interface: NodeInterface {
            description: "Generates a completion and records token usage".into(),
            inputs: vec![],
            outputs: vec![
                PortSpec::new("response", "str").describe("Generated text"),
                PortSpec::new("llm_usage", "dict")
                    .describe("Token usage for the call")
                    .with_structure(indexmap! {
                        "model".to_string() => StructureField::leaf("str"),
                        "input_tokens".to_string() => StructureField::leaf("int"),
                        "output_tokens".to_string() => StructureField::leaf("int"),
                        "total_tokens".to_string() => StructureField::leaf("int"),
                    }),
            ],
            params: vec![
                PortSpec::new("model", "str").describe("Model identifier"),
                PortSpec::new("prompt", "str").describe("Prompt text"),
            ],
            actions: vec!["default".into(), "error".into()],
        },
        requires_model: true,
        constructor: Some(construct_llm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pflow_registry::node_type_from_class_name;

    #[test]
    fn installs_all_builtin_types() {
        let registry = builtin_registry();
        let mut names = registry.list_nodes();
        names.sort();
        assert_eq!(names, vec!["http", "llm", "read-file", "shell", "write-file"]);
    }

    #[test]
    fn entries_are_instantiable() {
        let registry = builtin_registry();
        for name in registry.list_nodes() {
            let entry = registry.get(&name).expect("entry");
            assert!(entry.instantiate().is_some(), "{name} must construct");
            assert!(!entry.interface.outputs.is_empty(), "{name} declares outputs");
            assert!(entry.interface.actions.contains(&"default".to_string()));
        }
    }

    #[test]
    fn names_follow_class_name_convention() {
        let registry = builtin_registry();
        for name in registry.list_nodes() {
            let entry = registry.get(&name).expect("entry");
            assert_eq!(node_type_from_class_name(&entry.class_name), entry.name);
        }
    }

    #[test]
    fn only_llm_requires_model() {
        let registry = builtin_registry();
        for name in registry.list_nodes() {
            let entry = registry.get(&name).expect("entry");
            assert_eq!(entry.requires_model, name == "llm");
        }
    }
}
