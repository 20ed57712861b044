use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QuestError;
use crate::quest::QuestDocument;

/// Minimum number of scenes a usable quest needs.
pub const MIN_NODES: usize = 3;

/// Typed view of a generated quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub quest_title: String,
    pub start_node_id: String,
    pub nodes: Vec<Node>,
}

/// A single scene in the quest graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within the quest.
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub description: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub text: String,
    pub target_node_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Story,
    Choice,
    EndingSuccess,
    EndingFailure,
}

impl NodeType {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::EndingSuccess | Self::EndingFailure)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Story => "STORY",
            Self::Choice => "CHOICE",
            Self::EndingSuccess => "ENDING_SUCCESS",
            Self::EndingFailure => "ENDING_FAILURE",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Schema violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The document does not even have the quest shape.
    Malformed(String),
    TooFewNodes(usize),
    DuplicateNodeId(String),
    MissingEnding(NodeType),
    UnknownStartNode(String),
    DanglingChoice { from: String, target: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(why) => write!(f, "not a quest document: {why}"),
            Self::TooFewNodes(n) => write!(f, "{n} nodes, at least {MIN_NODES} required"),
            Self::DuplicateNodeId(id) => write!(f, "node id '{id}' is used more than once"),
            Self::MissingEnding(kind) => write!(f, "no {kind} node"),
            Self::UnknownStartNode(id) => write!(f, "startNodeId '{id}' matches no node"),
            Self::DanglingChoice { from, target } => {
                write!(f, "choice in '{from}' points to missing node '{target}'")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graph queries
// ---------------------------------------------------------------------------

impl Quest {
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Non-terminal scenes on the longest cycle-free route from the start
    /// node, i.e. the most decisions a player can make in one playthrough.
    pub fn longest_route(&self) -> usize {
        let mut on_path = HashSet::new();
        self.longest_from(&self.start_node_id, &mut on_path)
    }

    fn longest_from<'a>(&'a self, node_id: &'a str, on_path: &mut HashSet<&'a str>) -> usize {
        let node = match self.get(node_id) {
            Some(n) => n,
            None => return 0,
        };
        if node.node_type.is_terminal() || !on_path.insert(node_id) {
            return 0;
        }
        let max_child = node
            .choices
            .iter()
            .map(|c| self.longest_from(&c.target_node_id, on_path))
            .max()
            .unwrap_or(0);
        on_path.remove(node_id);
        1 + max_child
    }

    /// Every structural rule the prompt asks for that this quest breaks.
    pub fn check(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.nodes.len() < MIN_NODES {
            violations.push(Violation::TooFewNodes(self.nodes.len()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                violations.push(Violation::DuplicateNodeId(node.id.clone()));
            }
        }

        for kind in [NodeType::EndingSuccess, NodeType::EndingFailure] {
            if !self.nodes.iter().any(|n| n.node_type == kind) {
                violations.push(Violation::MissingEnding(kind));
            }
        }

        if !seen.contains(self.start_node_id.as_str()) {
            violations.push(Violation::UnknownStartNode(self.start_node_id.clone()));
        }

        for node in &self.nodes {
            for choice in &node.choices {
                if !seen.contains(choice.target_node_id.as_str()) {
                    violations.push(Violation::DanglingChoice {
                        from: node.id.clone(),
                        target: choice.target_node_id.clone(),
                    });
                }
            }
        }

        violations
    }
}

/// Optional post-parse step: read the document as a [`Quest`] and reject it
/// if it breaks any structural rule.
pub fn check_document(doc: &QuestDocument) -> Result<Quest, QuestError> {
    let quest: Quest = serde_json::from_value(doc.as_value().clone())
        .map_err(|e| QuestError::SchemaViolation(vec![Violation::Malformed(e.to_string())]))?;

    let violations = quest.check();
    if violations.is_empty() {
        Ok(quest)
    } else {
        Err(QuestError::SchemaViolation(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::extract_quest;

    const LIGHTHOUSE: &str = r#"{
        "questTitle": "Маяк",
        "startNodeId": "shore",
        "nodes": [
            {"id": "shore", "title": "Берег", "type": "STORY", "description": "Туман.",
             "choices": [{"text": "Войти", "targetNodeId": "stairs"}]},
            {"id": "stairs", "title": "Лестница", "type": "CHOICE", "description": "Скрип.",
             "choices": [{"text": "Наверх", "targetNodeId": "lamp"},
                         {"text": "Вниз", "targetNodeId": "cellar"}]},
            {"id": "lamp", "title": "Свет", "type": "ENDING_SUCCESS", "description": "Огонь горит."},
            {"id": "cellar", "title": "Подвал", "type": "ENDING_FAILURE", "description": "Тьма.",
             "choices": []}
        ]
    }"#;

    #[test]
    fn test_valid_quest_passes() {
        let doc = extract_quest(LIGHTHOUSE).unwrap();
        let quest = check_document(&doc).unwrap();
        assert_eq!(quest.nodes.len(), 4);
        assert_eq!(quest.get(&quest.start_node_id).unwrap().title, "Берег");
        assert_eq!(quest.get("lamp").unwrap().node_type, NodeType::EndingSuccess);
        assert_eq!(quest.longest_route(), 2);
    }

    #[test]
    fn test_reports_every_violation() {
        let quest = Quest {
            quest_title: "t".into(),
            start_node_id: "nowhere".into(),
            nodes: vec![
                Node {
                    id: "a".into(),
                    title: "A".into(),
                    node_type: NodeType::Story,
                    description: String::new(),
                    choices: vec![Choice {
                        text: "go".into(),
                        target_node_id: "ghost".into(),
                    }],
                },
                Node {
                    id: "a".into(),
                    title: "A again".into(),
                    node_type: NodeType::EndingSuccess,
                    description: String::new(),
                    choices: vec![],
                },
            ],
        };
        let violations = quest.check();
        assert!(violations.contains(&Violation::TooFewNodes(2)));
        assert!(violations.contains(&Violation::DuplicateNodeId("a".into())));
        assert!(violations.contains(&Violation::MissingEnding(NodeType::EndingFailure)));
        assert!(!violations.contains(&Violation::MissingEnding(NodeType::EndingSuccess)));
        assert!(violations.contains(&Violation::UnknownStartNode("nowhere".into())));
        assert!(violations.contains(&Violation::DanglingChoice {
            from: "a".into(),
            target: "ghost".into()
        }));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let doc = extract_quest(r#"{"questTitle": "X"}"#).unwrap();
        match check_document(&doc).unwrap_err() {
            QuestError::SchemaViolation(v) => assert!(matches!(v[0], Violation::Malformed(_))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_longest_route_survives_cycles() {
        let quest = Quest {
            quest_title: "loop".into(),
            start_node_id: "a".into(),
            nodes: vec![
                Node {
                    id: "a".into(),
                    title: "A".into(),
                    node_type: NodeType::Choice,
                    description: String::new(),
                    choices: vec![Choice {
                        text: "b".into(),
                        target_node_id: "b".into(),
                    }],
                },
                Node {
                    id: "b".into(),
                    title: "B".into(),
                    node_type: NodeType::Choice,
                    description: String::new(),
                    choices: vec![Choice {
                        text: "a".into(),
                        target_node_id: "a".into(),
                    }],
                },
            ],
        };
        assert_eq!(quest.longest_route(), 2);
    }
}
