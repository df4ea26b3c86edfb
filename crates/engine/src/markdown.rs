//! Markdown workflow parser for `.pflow.md` files.
//!
//! Parses an authored markdown document into the same IR shape a JSON
//! workflow produces. This is a line-oriented state machine, not a
//! markdown-library call: it front-loads structural validation with
//! 1-based source line numbers so the downstream schema check becomes a
//! safety net that rarely triggers. YAML fragments (frontmatter, `- key:
//! value` parameter items, `yaml`-tagged code blocks) are the only pieces
//! delegated to a parser.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map as JsonMap, Value, json};

static NODE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid entity id pattern"));
static YAML_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)- (.+)$").expect("valid yaml item pattern"));
static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^(`{3,}|~{3,})").expect("valid fence pattern"));

/// Error raised when markdown workflow content cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownParseError {
    /// What was wrong.
    pub message: String,
    /// 1-based source line where the problem is, when known.
    pub line: Option<usize>,
    /// Optional fix suggestion showing correct syntax.
    pub suggestion: Option<String>,
}

impl MarkdownParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            suggestion: None,
        }
    }

    fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for MarkdownParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(line) = self.line {
            write!(f, "Line {line}: ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\n{suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MarkdownParseError {}

/// Result of parsing a `.pflow.md` file.
#[derive(Debug, Clone, Default)]
pub struct MarkdownParseResult {
    /// The workflow IR, same shape as a parsed JSON document.
    pub ir: Value,
    /// H1 heading text, when present.
    pub title: Option<String>,
    /// Prose between the H1 and the first H2.
    pub description: Option<String>,
    /// Frontmatter mapping, when the file opens with a `---` block.
    pub metadata: Option<Value>,
    /// Original markdown content, preserved for save operations.
    pub source: String,
    /// Non-fatal findings such as near-miss section names.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Inputs,
    Steps,
    Outputs,
    Unknown,
}

#[derive(Debug, Clone)]
struct CodeBlock {
    tag: String,
    param_name: String,
    content: String,
    start_line: usize,
    is_yaml_config: bool,
}

#[derive(Debug, Clone)]
struct Entity {
    id: String,
    heading_line: usize,
    prose_parts: Vec<String>,
    yaml_items: Vec<String>,
    code_blocks: Vec<CodeBlock>,
    section: Section,
}

/// Parses a `.pflow.md` workflow document into an IR value.
pub fn parse_markdown(content: &str) -> Result<MarkdownParseResult, MarkdownParseError> {
    let mut result = MarkdownParseResult {
        source: content.to_string(),
        ..Default::default()
    };
    let mut warnings = Vec::new();

    let lines: Vec<&str> = content.lines().collect();

    // Phase 1: frontmatter.
    let mut body_start = 0;
    if lines.first().map(|line| line.trim_end()) == Some("---")
        && let Some(closing) = lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, line)| line.trim_end() == "---")
            .map(|(index, _)| index)
    {
        let frontmatter = lines[1..closing].join("\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&frontmatter).map_err(|error| {
            MarkdownParseError::new(format!("Invalid YAML in frontmatter: {error}")).at_line(1)
        })?;
        if parsed.is_mapping() {
            result.metadata = serde_json::to_value(parsed).ok();
        }
        body_start = closing + 1;
    }

    // Phase 2: line-by-line state machine.
    let mut current_section = Section::None;
    let mut h1_found = false;
    let mut h1_prose: Vec<String> = Vec::new();
    let mut entities: Vec<Entity> = Vec::new();
    let mut current_entity: Option<usize> = None;

    let mut in_code_block = false;
    let mut fence_pattern = String::new();
    let mut fence_line = 0usize;
    let mut block_tag = String::new();
    let mut block_lines: Vec<String> = Vec::new();

    let mut yaml_item_lines: Vec<String> = Vec::new();
    let mut yaml_indent = 0usize;
    let mut in_yaml_continuation = false;
    let mut steps_section_found = false;

    macro_rules! flush_yaml {
        () => {
            if !yaml_item_lines.is_empty() {
                if let Some(index) = current_entity {
                    entities[index].yaml_items.push(yaml_item_lines.join("\n"));
                }
                yaml_item_lines.clear();
            }
            in_yaml_continuation = false;
        };
    }

    for (line_index, &line) in lines.iter().enumerate().skip(body_start) {
        let line_number = line_index + 1;
        let stripped = line.trim();

        // Code fences take priority over everything else.
        if is_code_fence(line) {
            if in_code_block {
                if is_closing_fence(line, &fence_pattern) {
                    let block_content = block_lines.join("\n");
                    if let Some(index) = current_entity {
                        append_code_block(&mut entities[index], &block_tag, block_content, fence_line);
                    }
                    in_code_block = false;
                    block_lines.clear();
                } else {
                    block_lines.push(line.to_string());
                }
                continue;
            }
            flush_yaml!();
            if let Some(captures) = FENCE_RE.captures(stripped) {
                fence_pattern = captures[1].to_string();
                block_tag = stripped[fence_pattern.len()..].trim().to_string();
                fence_line = line_number;
                in_code_block = true;
                block_lines.clear();
            }
            continue;
        }
        if in_code_block {
            block_lines.push(line.to_string());
            continue;
        }

        // H1.
        if stripped.starts_with("# ") && !stripped.starts_with("## ") {
            flush_yaml!();
            if !h1_found {
                h1_found = true;
                result.title = Some(stripped[2..].trim().to_string());
                current_entity = None;
            }
            continue;
        }

        // H2: section boundary.
        if stripped.starts_with("## ") && !stripped.starts_with("### ") {
            flush_yaml!();
            current_entity = None;
            let section_name = stripped[3..].trim();
            let (section, warning) = resolve_section(section_name, line_number);
            if section == Section::Steps {
                steps_section_found = true;
            }
            if let Some(warning) = warning {
                warnings.push(warning);
            }
            current_section = section;
            continue;
        }

        // H3: entity.
        if stripped.starts_with("### ") && !stripped.starts_with("#### ") {
            flush_yaml!();
            let entity_id = stripped[4..].trim().to_string();
            if !NODE_ID_RE.is_match(&entity_id) {
                return Err(MarkdownParseError::new(format!(
                    "Invalid entity ID '{entity_id}'."
                ))
                .at_line(line_number)
                .suggest(format!(
                    "IDs must start with a lowercase letter and contain only lowercase \
                     letters, digits, hyphens, and underscores.\nPattern: {}",
                    NODE_ID_RE.as_str()
                )));
            }
            if let Some(existing) = entities
                .iter()
                .find(|entity| entity.id == entity_id && entity.section == current_section)
            {
                return Err(MarkdownParseError::new(format!(
                    "Duplicate entity ID '{entity_id}'."
                ))
                .at_line(line_number)
                .suggest(format!(
                    "An entity with ID '{entity_id}' was already defined at line {}.",
                    existing.heading_line
                )));
            }
            entities.push(Entity {
                id: entity_id,
                heading_line: line_number,
                prose_parts: Vec::new(),
                yaml_items: Vec::new(),
                code_blocks: Vec::new(),
                section: current_section,
            });
            current_entity = Some(entities.len() - 1);
            continue;
        }

        // Inside an entity: YAML parameter items and prose.
        if current_entity.is_some() {
            if in_yaml_continuation {
                if !line.trim().is_empty() {
                    let content_start = line.len() - line.trim_start().len();
                    if content_start >= yaml_indent {
                        yaml_item_lines.push(line.to_string());
                        continue;
                    }
                }
                flush_yaml!();
            }

            if let Some(captures) = YAML_ITEM_RE.captures(line) {
                flush_yaml!();
                let leading = captures[1].len();
                yaml_item_lines.push(line.trim_end().to_string());
                yaml_indent = leading + 2;
                in_yaml_continuation = true;
                continue;
            }

            if stripped.is_empty() {
                flush_yaml!();
                continue;
            }

            flush_yaml!();
            if let Some(index) = current_entity {
                entities[index].prose_parts.push(stripped.to_string());
            }
            continue;
        }

        // Prose between the H1 and the first H2 becomes the description.
        if h1_found && current_section == Section::None && !stripped.is_empty() {
            h1_prose.push(stripped.to_string());
        }
    }

    flush_yaml!();

    if in_code_block {
        return Err(MarkdownParseError::new("Unclosed code block.")
            .at_line(fence_line)
            .suggest(format!(
                "Add a closing fence ({fence_pattern}) to match the opening fence at line {fence_line}."
            )));
    }

    if !h1_prose.is_empty() {
        result.description = Some(h1_prose.join("\n"));
    }

    // Phase 3: structure.
    if !steps_section_found {
        return Err(MarkdownParseError::new("Missing '## Steps' section.").suggest(
            "Every workflow needs a Steps section with at least one node:\n\n    ## Steps\n\n    \
             ### my-node\n\n    Description of what this node does.\n\n    - type: shell",
        ));
    }
    let has_steps = entities.iter().any(|entity| entity.section == Section::Steps);
    if !has_steps {
        return Err(MarkdownParseError::new("The '## Steps' section has no nodes.").suggest(
            "Add at least one node with a ### heading:\n\n    ## Steps\n\n    ### my-node\n\n    \
             Description of what this node does.\n\n    - type: shell",
        ));
    }

    // Phase 4: build the IR.
    let mut ir = JsonMap::new();

    let input_entities: Vec<&Entity> = entities
        .iter()
        .filter(|entity| entity.section == Section::Inputs)
        .collect();
    if !input_entities.is_empty() {
        let mut inputs = JsonMap::new();
        for entity in input_entities {
            inputs.insert(entity.id.clone(), build_input(entity)?);
        }
        ir.insert("inputs".to_string(), Value::Object(inputs));
    }

    let mut nodes = Vec::new();
    for entity in entities.iter().filter(|entity| entity.section == Section::Steps) {
        nodes.push(build_node(entity)?);
    }
    let edges: Vec<Value> = nodes
        .windows(2)
        .map(|pair| json!({"from": pair[0]["id"], "to": pair[1]["id"]}))
        .collect();
    ir.insert("nodes".to_string(), Value::Array(nodes));
    ir.insert("edges".to_string(), Value::Array(edges));

    let output_entities: Vec<&Entity> = entities
        .iter()
        .filter(|entity| entity.section == Section::Outputs)
        .collect();
    if !output_entities.is_empty() {
        let mut outputs = JsonMap::new();
        for entity in output_entities {
            outputs.insert(entity.id.clone(), build_output(entity)?);
        }
        ir.insert("outputs".to_string(), Value::Object(outputs));
    }

    result.ir = Value::Object(ir);
    result.warnings = warnings;
    Ok(result)
}

fn is_code_fence(line: &str) -> bool {
    let stripped = line.trim();
    stripped.starts_with("```") || stripped.starts_with("~~~")
}

fn is_closing_fence(line: &str, opening: &str) -> bool {
    let stripped = line.trim();
    let fence_char = opening.chars().next().unwrap_or('`');
    !stripped.is_empty()
        && stripped.len() >= opening.len()
        && stripped.chars().all(|character| character == fence_char)
}

fn resolve_section(name: &str, line_number: usize) -> (Section, Option<String>) {
    match name.to_ascii_lowercase().as_str() {
        "inputs" => (Section::Inputs, None),
        "steps" => (Section::Steps, None),
        "outputs" => (Section::Outputs, None),
        near_miss @ ("input" | "output" | "step") => {
            let expected = match near_miss {
                "input" => "Inputs",
                "output" => "Outputs",
                _ => "Steps",
            };
            (
                Section::Unknown,
                Some(format!(
                    "Line {line_number}: '## {name}' looks like a typo — did you mean '## {expected}'?"
                )),
            )
        }
        _ => (Section::Unknown, None),
    }
}

/// The last word of a fence info string is the parameter name; preceding
/// words are editor language hints.
fn extract_param_name(tag: &str) -> String {
    tag.split_whitespace().last().unwrap_or("").to_string()
}

fn append_code_block(entity: &mut Entity, tag: &str, content: String, start_line: usize) {
    let trimmed = tag.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let is_yaml = words.len() > 1 && words[0].eq_ignore_ascii_case("yaml");
    entity.code_blocks.push(CodeBlock {
        tag: trimmed.to_string(),
        param_name: extract_param_name(trimmed),
        content,
        start_line,
        is_yaml_config: is_yaml,
    });
}

fn parse_yaml_items(entity: &Entity) -> Result<JsonMap<String, Value>, MarkdownParseError> {
    if entity.yaml_items.is_empty() {
        return Ok(JsonMap::new());
    }
    let yaml_text = entity.yaml_items.join("\n");
    let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml_text).map_err(|error| {
        MarkdownParseError::new(format!(
            "YAML syntax error in parameters for '{}': {error}",
            entity.id
        ))
        .at_line(entity.heading_line)
    })?;

    let serde_yaml::Value::Sequence(items) = parsed else {
        return Err(MarkdownParseError::new(format!(
            "Parameters for '{}' did not parse as a list of key-value pairs.",
            entity.id
        ))
        .at_line(entity.heading_line));
    };

    let mut merged = JsonMap::new();
    for item in items {
        let Some(json_item) = serde_json::to_value(&item).ok().and_then(|value| {
            value.as_object().cloned()
        }) else {
            return Err(MarkdownParseError::new(format!(
                "'{}' is not a valid parameter. Use * for documentation bullets.",
                yaml_scalar_display(&item)
            ))
            .at_line(entity.heading_line)
            .suggest(
                "Parameters must be key: value pairs:\n    - type: shell\n    - timeout: 30\n\n\
                 For notes, use * instead of -:\n    * This is a documentation note",
            ));
        };
        for (key, value) in json_item {
            merged.insert(key, value);
        }
    }
    Ok(merged)
}

fn yaml_scalar_display(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| "<value>".to_string())
}

fn validate_code_blocks(entity: &Entity) -> Result<(), MarkdownParseError> {
    let mut seen: Vec<(&str, usize)> = Vec::new();

    for block in &entity.code_blocks {
        if block.tag.is_empty() {
            let preceding_tagged = entity
                .code_blocks
                .iter()
                .filter(|other| !other.tag.is_empty() && other.start_line < block.start_line)
                .next_back();
            if let Some(last) = preceding_tagged {
                return Err(MarkdownParseError::new(format!(
                    "Code block has no tag (likely caused by nested ``` in the `{}` block at line {}).",
                    last.tag, last.start_line
                ))
                .at_line(block.start_line)
                .suggest(format!(
                    "An inner ``` closes the outer block early, making this line\nlook like a new \
                     code block.\n\nFix: Use 4+ backticks for the outer fence:\n    ````{}\n    \
                     content with ``` inside\n    ````",
                    last.tag
                )));
            }
            return Err(MarkdownParseError::new("Code block has no tag.")
                .at_line(block.start_line)
                .suggest(
                    "Add a tag to identify what this code block contains:\n    ```shell command\n    \
                     ```prompt\n    ```yaml batch\n\nTip: To include ``` inside a code block, use \
                     4+ backticks or tildes for the outer fence.",
                ));
        }

        if let Some((_, first_line)) = seen
            .iter()
            .find(|(name, _)| *name == block.param_name.as_str())
        {
            return Err(MarkdownParseError::new(format!(
                "Duplicate code block for '{}'.",
                block.param_name
            ))
            .at_line(block.start_line)
            .suggest(format!(
                "A '{}' code block was already defined at line {first_line}. Each parameter can \
                 only have one code block.",
                block.param_name
            )));
        }
        seen.push((block.param_name.as_str(), block.start_line));

        if block.is_yaml_config
            && let Err(error) = serde_yaml::from_str::<serde_yaml::Value>(&block.content)
        {
            return Err(MarkdownParseError::new(format!(
                "YAML syntax error in '{}' block: {error}",
                block.tag
            ))
            .at_line(block.start_line));
        }
    }
    Ok(())
}

fn validate_description(entity: &Entity) -> Result<(), MarkdownParseError> {
    if entity.prose_parts.is_empty() {
        return Err(MarkdownParseError::new(format!(
            "Entity '{}' (line {}) is missing a description.",
            entity.id, entity.heading_line
        ))
        .at_line(entity.heading_line)
        .suggest(format!(
            "Add a text paragraph between the heading and the parameters:\n\n    ### {}\n\n    \
             Description of what this entity does and why.\n\n    - type: shell",
            entity.id
        )));
    }
    Ok(())
}

fn check_param_code_block_conflicts(
    entity: &Entity,
    params: &JsonMap<String, Value>,
) -> Result<(), MarkdownParseError> {
    for block in &entity.code_blocks {
        if !block.param_name.is_empty() && params.contains_key(&block.param_name) {
            return Err(MarkdownParseError::new(format!(
                "Parameter '{}' is defined both inline and as a code block.",
                block.param_name
            ))
            .at_line(block.start_line)
            .suggest(format!(
                "Remove either the inline '- {}: ...' or the code block. Each parameter should \
                 be defined only once.",
                block.param_name
            )));
        }
    }
    Ok(())
}

fn parse_yaml_block(block: &CodeBlock) -> Result<Value, MarkdownParseError> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(&block.content).map_err(|error| {
        MarkdownParseError::new(format!("YAML syntax error in '{}' block: {error}", block.tag))
            .at_line(block.start_line)
    })?;
    serde_json::to_value(parsed).map_err(|error| {
        MarkdownParseError::new(format!(
            "'{}' block does not convert to JSON: {error}",
            block.tag
        ))
        .at_line(block.start_line)
    })
}

/// Inputs get flat mappings: description from prose, then `- key: value`
/// items, then code blocks by parameter name.
fn build_input(entity: &Entity) -> Result<Value, MarkdownParseError> {
    validate_description(entity)?;
    validate_code_blocks(entity)?;

    let mut input = JsonMap::new();
    if let Some(prose) = joined_prose(entity) {
        input.insert("description".to_string(), Value::String(prose));
    }
    for (key, value) in parse_yaml_items(entity)? {
        input.insert(key, value);
    }
    for block in &entity.code_blocks {
        if !block.param_name.is_empty() {
            let value = if block.is_yaml_config {
                parse_yaml_block(block)?
            } else {
                Value::String(block.content.clone())
            };
            input.insert(block.param_name.clone(), value);
        }
    }
    Ok(Value::Object(input))
}

/// Steps route `type` and `batch` to the node's top level, prose to
/// `purpose`, and everything else under `params`.
fn build_node(entity: &Entity) -> Result<Value, MarkdownParseError> {
    validate_description(entity)?;
    validate_code_blocks(entity)?;

    let mut node = JsonMap::new();
    node.insert("id".to_string(), Value::String(entity.id.clone()));

    let mut params = parse_yaml_items(entity)?;
    check_param_code_block_conflicts(entity, &params)?;

    let Some(node_type) = params.remove("type") else {
        return Err(MarkdownParseError::new(format!(
            "Node '{}' is missing a 'type' parameter.",
            entity.id
        ))
        .at_line(entity.heading_line)
        .suggest(format!(
            "Every node needs a type:\n\n    ### {}\n\n    Description of what this node \
             does.\n\n    - type: shell",
            entity.id
        )));
    };
    node.insert("type".to_string(), node_type);

    if let Some(batch) = params.remove("batch") {
        node.insert("batch".to_string(), batch);
    }

    if let Some(prose) = joined_prose(entity) {
        node.insert("purpose".to_string(), Value::String(prose));
    }

    for block in &entity.code_blocks {
        if block.param_name.is_empty() {
            continue;
        }
        let value = if block.is_yaml_config {
            parse_yaml_block(block)?
        } else {
            Value::String(block.content.clone())
        };
        if block.param_name == "batch" {
            node.insert("batch".to_string(), value);
        } else {
            params.insert(block.param_name.clone(), value);
        }
    }

    if !params.is_empty() {
        node.insert("params".to_string(), Value::Object(params));
    }
    Ok(Value::Object(node))
}

/// Outputs get flat mappings; a `source`-tagged code block contributes
/// the `source` value.
fn build_output(entity: &Entity) -> Result<Value, MarkdownParseError> {
    validate_description(entity)?;
    validate_code_blocks(entity)?;

    let mut output = JsonMap::new();
    if let Some(prose) = joined_prose(entity) {
        output.insert("description".to_string(), Value::String(prose));
    }
    for (key, value) in parse_yaml_items(entity)? {
        output.insert(key, value);
    }
    for block in &entity.code_blocks {
        if !block.param_name.is_empty() {
            let value = if block.is_yaml_config {
                parse_yaml_block(block)?
            } else {
                Value::String(block.content.clone())
            };
            output.insert(block.param_name.clone(), value);
        }
    }
    Ok(Value::Object(output))
}

fn joined_prose(entity: &Entity) -> Option<String> {
    if entity.prose_parts.is_empty() {
        None
    } else {
        Some(entity.prose_parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASIC: &str = "\
# Greeting workflow

Says hello and saves the result.

## Inputs

### name

Who to greet.

- type: string
- required: true

## Steps

### greet

Produce the greeting.

- type: shell

```shell command
echo hello ${name}
```

### save

Persist the greeting.

- type: write-file
- file_path: /tmp/greeting.txt
- content: ${greet.stdout}

## Outputs

### greeting

The produced greeting.

- type: string

```text source
${greet.stdout}
```
";

    #[test]
    fn parses_basic_document() {
        let parsed = parse_markdown(BASIC).expect("parse");
        assert_eq!(parsed.title.as_deref(), Some("Greeting workflow"));
        assert_eq!(
            parsed.description.as_deref(),
            Some("Says hello and saves the result.")
        );

        let ir = &parsed.ir;
        assert_eq!(ir["inputs"]["name"]["type"], json!("string"));
        assert_eq!(ir["inputs"]["name"]["required"], json!(true));
        assert_eq!(
            ir["inputs"]["name"]["description"],
            json!("Who to greet.")
        );

        let nodes = ir["nodes"].as_array().expect("nodes");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["id"], json!("greet"));
        assert_eq!(nodes[0]["type"], json!("shell"));
        assert_eq!(nodes[0]["purpose"], json!("Produce the greeting."));
        assert_eq!(nodes[0]["params"]["command"], json!("echo hello ${name}"));
        assert_eq!(nodes[1]["params"]["content"], json!("${greet.stdout}"));

        let edges = ir["edges"].as_array().expect("edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["from"], json!("greet"));
        assert_eq!(edges[0]["to"], json!("save"));

        assert_eq!(ir["outputs"]["greeting"]["source"], json!("${greet.stdout}"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn parsed_ir_passes_schema_validation() {
        let parsed = parse_markdown(BASIC).expect("parse");
        crate::ir::load_document(parsed.ir).expect("markdown IR should validate");
    }

    #[test]
    fn frontmatter_is_captured() {
        let content = "---\nauthor: someone\nversion: 2\n---\n# T\n\n## Steps\n\n### n\n\nDoes a thing.\n\n- type: shell\n- command: true\n";
        let parsed = parse_markdown(content).expect("parse");
        let metadata = parsed.metadata.expect("metadata");
        assert_eq!(metadata["author"], json!("someone"));
        assert_eq!(metadata["version"], json!(2));
    }

    #[test]
    fn missing_steps_section_fails() {
        let error = parse_markdown("# T\n\nprose only\n").expect_err("no steps");
        assert!(error.message.contains("Missing '## Steps'"));
        assert!(error.suggestion.unwrap().contains("### my-node"));
    }

    #[test]
    fn empty_steps_section_fails() {
        let error = parse_markdown("# T\n\n## Steps\n\nno entities here\n").expect_err("empty steps");
        assert!(error.message.contains("has no nodes"));
    }

    #[test]
    fn node_without_type_fails_with_line() {
        let content = "## Steps\n\n### broken\n\nA node without a type.\n\n- timeout: 5\n";
        let error = parse_markdown(content).expect_err("missing type");
        assert!(error.message.contains("missing a 'type' parameter"));
        assert_eq!(error.line, Some(3));
    }

    #[test]
    fn invalid_entity_id_fails() {
        let content = "## Steps\n\n### BadName\n\nUppercase is rejected.\n\n- type: shell\n";
        let error = parse_markdown(content).expect_err("bad id");
        assert!(error.message.contains("Invalid entity ID 'BadName'"));
        assert_eq!(error.line, Some(3));
    }

    #[test]
    fn duplicate_entity_id_fails() {
        let content = "## Steps\n\n### twin\n\nFirst.\n\n- type: shell\n\n### twin\n\nSecond.\n\n- type: shell\n";
        let error = parse_markdown(content).expect_err("duplicate id");
        assert!(error.message.contains("Duplicate entity ID 'twin'"));
        assert!(error.suggestion.unwrap().contains("line 3"));
    }

    #[test]
    fn missing_description_fails() {
        let content = "## Steps\n\n### terse\n\n- type: shell\n";
        let error = parse_markdown(content).expect_err("no description");
        assert!(error.message.contains("missing a description"));
    }

    #[test]
    fn near_miss_section_warns() {
        let content = "## Step\n\n### n\n\nD.\n\n- type: shell\n\n## Steps\n\n### m\n\nD.\n\n- type: shell\n";
        let parsed = parse_markdown(content).expect("parse");
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("did you mean '## Steps'"));
    }

    #[test]
    fn yaml_batch_block_is_structured() {
        let content = "## Steps\n\n### handle\n\nProcess each file.\n\n- type: shell\n\n```yaml batch\nitems: \"${list.files}\"\nas: entry\nerror_handling: continue\n```\n";
        let parsed = parse_markdown(content).expect("parse");
        let node = &parsed.ir["nodes"][0];
        assert_eq!(node["batch"]["items"], json!("${list.files}"));
        assert_eq!(node["batch"]["as"], json!("entry"));
        assert!(node.get("params").is_none());
    }

    #[test]
    fn inline_and_code_block_collision_fails() {
        let content = "## Steps\n\n### n\n\nD.\n\n- type: shell\n- command: echo hi\n\n```shell command\necho other\n```\n";
        let error = parse_markdown(content).expect_err("collision");
        assert!(error.message.contains("both inline and as a code block"));
    }

    #[test]
    fn duplicate_code_blocks_fail() {
        let content = "## Steps\n\n### n\n\nD.\n\n- type: shell\n\n```shell command\na\n```\n\n```shell command\nb\n```\n";
        let error = parse_markdown(content).expect_err("duplicate block");
        assert!(error.message.contains("Duplicate code block for 'command'"));
    }

    #[test]
    fn untagged_code_block_fails() {
        let content = "## Steps\n\n### n\n\nD.\n\n- type: shell\n\n```\nbare\n```\n";
        let error = parse_markdown(content).expect_err("bare block");
        assert!(error.message.contains("no tag"));
    }

    #[test]
    fn unclosed_code_block_fails() {
        let content = "## Steps\n\n### n\n\nD.\n\n- type: shell\n\n```shell command\necho hi\n";
        let error = parse_markdown(content).expect_err("unclosed");
        assert!(error.message.contains("Unclosed code block"));
    }

    #[test]
    fn multiline_yaml_item_continuations() {
        let content = "## Steps\n\n### n\n\nD.\n\n- type: shell\n- headers:\n    accept: application/json\n    agent: pflow\n";
        let parsed = parse_markdown(content).expect("parse");
        let node = &parsed.ir["nodes"][0];
        assert_eq!(node["params"]["headers"]["accept"], json!("application/json"));
    }

    #[test]
    fn single_node_yields_no_edges() {
        let content = "## Steps\n\n### only\n\nD.\n\n- type: shell\n- command: true\n";
        let parsed = parse_markdown(content).expect("parse");
        assert_eq!(parsed.ir["edges"], json!([]));
    }
}
