#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pop_impute::{config::PipelineConfig, data::Value, frame::AttributeTable};
use tempfile::{TempDir, tempdir};

pub const AGES: [&str; 3] = ["20-24", "25-29", "30-34"];
pub const GENDERS: [&str; 2] = ["Female", "Male"];

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Lays out the three-stage scenario: a population of `rows` people with
    /// age and gender, and one source table per imputed attribute.
    pub fn scenario(&self, rows: usize, tasks: &str) -> PathBuf {
        self.write("data/population.csv", &population_csv(rows));
        self.write("data/attr_a.csv", &attr_a_csv());
        self.write("data/attr_b.csv", &attr_b_csv());
        self.write("data/attr_c.csv", &attr_c_csv());
        self.write("pipeline.yaml", &scenario_config(tasks, ""))
    }
}

pub fn population_csv(rows: usize) -> String {
    let mut csv = String::from("age,gender\n");
    for i in 0..rows {
        csv.push_str(&format!("{},{}\n", AGES[i % 3], GENDERS[(i / 3) % 2]));
    }
    csv
}

/// attr_a is `<gender initial><age index>`.
pub fn attr_a_for(age: usize, gender: usize) -> String {
    format!("{}{}", &GENDERS[gender][..1], age)
}

pub fn attr_a_csv() -> String {
    let mut csv = String::from("age,gender,attr_a\n");
    for _ in 0..8 {
        for (a, age) in AGES.iter().enumerate() {
            for (g, gender) in GENDERS.iter().enumerate() {
                csv.push_str(&format!("{age},{gender},{}\n", attr_a_for(a, g)));
            }
        }
    }
    csv
}

pub fn attr_b_csv() -> String {
    let mut csv = String::from("attr_a,attr_b\n");
    for _ in 0..8 {
        for a in 0..AGES.len() {
            for g in 0..GENDERS.len() {
                let answer = if g == 0 { "yes" } else { "no" };
                csv.push_str(&format!("{},{answer}\n", attr_a_for(a, g)));
            }
        }
    }
    csv
}

pub fn attr_c_csv() -> String {
    let mut csv = String::from("age,attr_a,attr_c,hours\n");
    for _ in 0..8 {
        for (a, age) in AGES.iter().enumerate() {
            for g in 0..GENDERS.len() {
                csv.push_str(&format!(
                    "{age},{},band{a},{}\n",
                    attr_a_for(a, g),
                    20 + 10 * a
                ));
            }
        }
    }
    csv
}

pub fn scenario_config(tasks: &str, extra: &str) -> String {
    format!(
        r#"population: data/population.csv
tables:
  attr_a: data/attr_a.csv
  attr_b: data/attr_b.csv
  attr_c: data/attr_c.csv
stages:
  attr_a:
    features: [age, gender]
    targets: [attr_a]
    test_size: 0.1
    booster: {{ min_child_weight: 0.1 }}
  attr_b:
    features: [attr_a]
    targets: [attr_b]
    booster: {{ min_child_weight: 0.1 }}
  attr_c:
    features: [age, attr_a]
    targets: [attr_c, hours]
tasks: "{tasks}"
seed: 42
{extra}"#
    )
}

pub fn load_config(path: &Path) -> PipelineConfig {
    PipelineConfig::load(path).expect("load config")
}

pub fn text(value: &str) -> Option<Value> {
    Some(Value::text(value))
}

pub fn table(columns: &[&str], rows: Vec<Vec<Option<Value>>>) -> AttributeTable {
    AttributeTable::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
        .expect("build table")
}
