//! Task schedule parsing.
//!
//! A schedule is a chain of stages separated by `->`. Each stage is a bare
//! attribute name or a bracketed group of names that run in parallel:
//!
//! ```text
//! industry -> [occupation, income] -> hours
//! ```

use std::{collections::HashSet, fmt, sync::OnceLock};

use regex::Regex;

use crate::error::{ImputeError, Result};

const STAGE_SEPARATOR: &str = "->";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Single(String),
    /// Members run against the same table and merge in listed order.
    Group(Vec<String>),
}

impl Stage {
    pub fn names(&self) -> &[String] {
        match self {
            Stage::Single(name) => std::slice::from_ref(name),
            Stage::Group(names) => names,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Single(name) => f.write_str(name),
            Stage::Group(names) => write!(f, "[{}]", names.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid(text, "schedule is empty"));
        }
        let mut stages = Vec::new();
        for segment in text.split(STAGE_SEPARATOR) {
            stages.push(parse_stage(text, segment.trim())?);
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Every scheduled attribute in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(Stage::names)
            .map(String::as_str)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .stages
            .iter()
            .map(Stage::to_string)
            .collect::<Vec<_>>();
        f.write_str(&rendered.join(" -> "))
    }
}

fn parse_stage(schedule: &str, segment: &str) -> Result<Stage> {
    if segment.is_empty() {
        return Err(invalid(schedule, "empty stage between '->' separators"));
    }
    let opens = segment.starts_with('[');
    let closes = segment.ends_with(']');
    match (opens, closes) {
        (true, true) => {
            let inner = &segment[1..segment.len() - 1];
            if inner.contains(['[', ']']) {
                return Err(invalid(schedule, "groups cannot be nested"));
            }
            let mut seen = HashSet::new();
            let mut names = Vec::new();
            for raw in inner.split(',') {
                let name = checked_name(schedule, raw.trim())?;
                if !seen.insert(name.clone()) {
                    return Err(invalid(
                        schedule,
                        &format!("'{name}' appears twice in one group"),
                    ));
                }
                names.push(name);
            }
            Ok(Stage::Group(names))
        }
        (false, false) => {
            if segment.contains(['[', ']']) {
                return Err(invalid(schedule, "unbalanced brackets"));
            }
            checked_name(schedule, segment).map(Stage::Single)
        }
        _ => Err(invalid(schedule, "unbalanced brackets")),
    }
}

fn checked_name(schedule: &str, name: &str) -> Result<String> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let pattern = NAME.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+$").unwrap_or_else(|e| panic!("stage name pattern: {e}"))
    });
    if name.is_empty() {
        return Err(invalid(schedule, "empty attribute name"));
    }
    if !pattern.is_match(name) {
        return Err(invalid(
            schedule,
            &format!("'{name}' is not a valid attribute name"),
        ));
    }
    Ok(name.to_string())
}

fn invalid(schedule: &str, reason: &str) -> ImputeError {
    ImputeError::Configuration(format!("invalid task schedule '{schedule}': {reason}"))
}
