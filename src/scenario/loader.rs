//! Loading, validation and selection of scenario files

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::common::{Error, Result};

use super::config::{Condition, Scenario, ScenarioDef, Step, SuiteFile, Target};

/// Which scenarios to run
#[derive(Debug, Default, Clone)]
pub struct Selection {
    /// Scenario names; empty means all
    pub names: Vec<String>,
    /// Keep scenarios carrying at least one of these tags; empty means all
    pub tags: Vec<String>,
}

/// Load every scenario under the given files and directories
///
/// Directories are searched (non-recursively) for `*.yaml` and `*.yml`
/// files, in file name order. Scenario names must be unique across
/// everything loaded.
pub fn load_paths(paths: &[PathBuf]) -> Result<Vec<Scenario>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(scenario_files(path)?);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(Error::Config(format!(
                "Scenario path '{}' does not exist",
                path.display()
            )));
        }
    }

    let mut scenarios = Vec::new();
    for file in files {
        scenarios.extend(load_file(&file)?);
    }

    let mut seen = HashSet::new();
    for scenario in &scenarios {
        if !seen.insert(scenario.name.as_str()) {
            return Err(Error::scenario_parse(
                &scenario.source,
                format!("duplicate scenario name '{}'", scenario.name),
            ));
        }
    }

    Ok(scenarios)
}

fn scenario_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::FileRead {
        path: dir.display().to_string(),
        error: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load the scenarios of a single file
pub fn load_file(path: &Path) -> Result<Vec<Scenario>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    parse_scenarios(&content, path)
}

/// Parse a scenario or suite document
///
/// `source` is recorded on each scenario and used in error messages.
pub fn parse_scenarios(content: &str, source: &Path) -> Result<Vec<Scenario>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| Error::scenario_parse(source, e))?;

    let is_suite = document
        .as_mapping()
        .is_some_and(|m| m.contains_key("scenarios"));

    let scenarios = if is_suite {
        let suite: SuiteFile =
            serde_yaml::from_value(document).map_err(|e| Error::scenario_parse(source, e))?;
        expand_suite(suite, source)?
    } else {
        let def: ScenarioDef =
            serde_yaml::from_value(document).map_err(|e| Error::scenario_parse(source, e))?;
        vec![resolve(def, None, &[], &[], source)?]
    };

    for scenario in &scenarios {
        validate(scenario).map_err(|e| {
            Error::scenario_parse(source, format!("scenario '{}': {}", scenario.name, e))
        })?;
    }

    Ok(scenarios)
}

fn expand_suite(suite: SuiteFile, source: &Path) -> Result<Vec<Scenario>> {
    tracing::debug!(
        "Expanding suite '{}' ({} scenarios) from {}",
        suite.suite,
        suite.scenarios.len(),
        source.display()
    );

    let base_url = suite
        .base_url
        .as_deref()
        .map(|url| parse_base_url(url, source))
        .transpose()?;

    suite
        .scenarios
        .into_iter()
        .map(|def| resolve(def, base_url.as_ref(), &suite.tags, &suite.setup, source))
        .collect()
}

/// Merge suite-level settings into one scenario
fn resolve(
    def: ScenarioDef,
    suite_base: Option<&Url>,
    suite_tags: &[String],
    suite_setup: &[Step],
    source: &Path,
) -> Result<Scenario> {
    let base_url = match def.base_url.as_deref() {
        Some(url) => Some(parse_base_url(url, source)?),
        None => suite_base.cloned(),
    };

    let mut tags = suite_tags.to_vec();
    for tag in def.tags {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let mut setup = suite_setup.to_vec();
    setup.extend(def.setup);

    Ok(Scenario {
        name: def.name,
        description: def.description,
        tags,
        base_url,
        skip: def.skip,
        requires: def.requires,
        setup,
        steps: def.steps,
        source: source.to_path_buf(),
    })
}

fn parse_base_url(url: &str, source: &Path) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::scenario_parse(source, format!("base_url '{}': {}", url, e)))
}

/// Structural checks serde cannot express
fn validate(scenario: &Scenario) -> std::result::Result<(), String> {
    if scenario.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if scenario.steps.is_empty() {
        return Err("has no steps".to_string());
    }

    let mut aliases: HashSet<&str> = HashSet::new();
    for (index, step) in scenario.setup.iter().chain(&scenario.steps).enumerate() {
        match step {
            Step::Navigate { url, .. } => {
                if url.trim().is_empty() {
                    return Err(format!("step {}: navigate needs a url", index + 1));
                }
            }
            Step::Locate { alias, .. } => {
                if alias.trim().is_empty() {
                    return Err(format!("step {}: locate needs a name", index + 1));
                }
                aliases.insert(alias.as_str());
            }
            Step::Act {
                interaction,
                target,
                value,
                ..
            } => {
                check_alias(&aliases, target, index)?;
                if interaction.needs_value() && value.is_none() {
                    return Err(format!(
                        "step {}: {} needs a value",
                        index + 1,
                        interaction.as_str()
                    ));
                }
            }
            Step::Assert {
                condition,
                target,
                expected,
                attribute,
                count,
                ..
            } => {
                let step_no = index + 1;
                match (condition.needs_target(), target) {
                    (true, None) => {
                        return Err(format!(
                            "step {}: {} needs a target",
                            step_no,
                            condition.as_str()
                        ))
                    }
                    (false, Some(_)) => {
                        return Err(format!(
                            "step {}: {} takes no target",
                            step_no,
                            condition.as_str()
                        ))
                    }
                    (_, Some(target)) => check_alias(&aliases, target, index)?,
                    (false, None) => {}
                }
                if condition.needs_expected() && expected.is_none() {
                    return Err(format!(
                        "step {}: {} needs an expected value",
                        step_no,
                        condition.as_str()
                    ));
                }
                if *condition == Condition::Attribute && attribute.is_none() {
                    return Err(format!("step {}: attribute needs an attribute name", step_no));
                }
                if *condition == Condition::Count && count.is_none() {
                    return Err(format!("step {}: count needs a count", step_no));
                }
            }
        }
    }

    Ok(())
}

fn check_alias(
    aliases: &HashSet<&str>,
    target: &Target,
    index: usize,
) -> std::result::Result<(), String> {
    match target {
        Target::Alias(alias) if !aliases.contains(alias.as_str()) => Err(format!(
            "step {}: '{}' is not defined by an earlier locate step",
            index + 1,
            alias
        )),
        _ => Ok(()),
    }
}

/// Narrow scenarios down to a selection, keeping file order
///
/// Naming a scenario that does not exist is an error, and so is a
/// selection that leaves nothing to run.
pub fn select(scenarios: Vec<Scenario>, selection: &Selection) -> Result<Vec<Scenario>> {
    for name in &selection.names {
        if !scenarios.iter().any(|s| &s.name == name) {
            return Err(Error::UnknownScenario(name.clone()));
        }
    }

    let selected: Vec<Scenario> = scenarios
        .into_iter()
        .filter(|s| selection.names.is_empty() || selection.names.contains(&s.name))
        .filter(|s| selection.tags.is_empty() || s.tags.iter().any(|t| selection.tags.contains(t)))
        .collect();

    if selected.is_empty() {
        return Err(Error::Config(
            "No scenarios match the selection".to_string(),
        ));
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
suite: example
base_url: https://example.test/app/
tags: [smoke]
setup:
  - action: navigate
    url: /
scenarios:
  - name: first
    tags: [nav]
    steps:
      - action: assert
        condition: title
        expected: Example
  - name: second
    base_url: https://other.test/
    requires: [logged-in]
    steps:
      - action: locate
        as: button
        target: { role: button, name: Go }
      - action: act
        interaction: click
        target: button
"#;

    fn parse(content: &str) -> Result<Vec<Scenario>> {
        parse_scenarios(content, Path::new("test.yaml"))
    }

    #[test]
    fn test_suite_expansion() {
        let scenarios = parse(SUITE).unwrap();
        assert_eq!(scenarios.len(), 2);

        let first = &scenarios[0];
        assert_eq!(first.tags, vec!["smoke", "nav"]);
        assert_eq!(first.setup.len(), 1);
        assert_eq!(first.steps_total(), 2);
        assert_eq!(
            first.base_url.as_ref().map(Url::as_str),
            Some("https://example.test/app/")
        );

        let second = &scenarios[1];
        assert_eq!(
            second.base_url.as_ref().map(Url::as_str),
            Some("https://other.test/")
        );
        assert_eq!(second.requires, vec!["logged-in"]);
        assert_eq!(second.source, PathBuf::from("test.yaml"));
    }

    #[test]
    fn test_single_scenario_file() {
        let scenarios = parse(
            r#"
name: lonely
steps:
  - action: navigate
    url: https://example.test/
"#,
        )
        .unwrap();
        assert_eq!(scenarios.len(), 1);
        assert!(scenarios[0].base_url.is_none());
        assert_eq!(
            scenarios[0].navigation_urls().collect::<Vec<_>>(),
            vec!["https://example.test/"]
        );
    }

    #[test]
    fn test_undefined_alias_rejected() {
        let err = parse(
            r#"
name: bad
steps:
  - action: act
    interaction: click
    target: nowhere
"#,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'nowhere' is not defined"));
    }

    #[test]
    fn test_alias_must_precede_use() {
        let err = parse(
            r#"
name: late
steps:
  - action: assert
    condition: visible
    target: later
  - action: locate
    as: later
    target: { id: x }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'later'"));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let cases = [
            ("- action: act\n    interaction: fill\n    target: { id: a }", "needs a value"),
            ("- action: assert\n    condition: visible", "needs a target"),
            (
                "- action: assert\n    condition: title\n    target: { id: a }\n    expected: x",
                "takes no target",
            ),
            ("- action: assert\n    condition: text\n    target: { id: a }", "needs an expected"),
            ("- action: assert\n    condition: count\n    target: { id: a }", "needs a count"),
        ];
        for (step, message) in cases {
            let doc = format!("name: t\nsteps:\n  {}\n", step);
            let err = parse(&doc).unwrap_err();
            assert!(
                err.to_string().contains(message),
                "expected '{}' in '{}'",
                message,
                err
            );
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("name: t\nstep: []\n").unwrap_err();
        assert!(err.to_string().contains("step"));
    }

    #[test]
    fn test_misspelled_step_field_rejected() {
        let err = parse(
            r#"
name: t
steps:
  - action: assert
    condition: visible
    target: { id: banner }
    timout_ms: 100
"#,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("timout_ms"), "{}", err);
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let err = parse("name: t\nbase_url: not a url\nsteps:\n  - action: navigate\n    url: /\n")
            .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_selection() {
        let scenarios = parse(SUITE).unwrap();

        let all = select(scenarios.clone(), &Selection::default()).unwrap();
        assert_eq!(all.len(), 2);

        let by_name = select(
            scenarios.clone(),
            &Selection {
                names: vec!["second".to_string()],
                tags: vec![],
            },
        )
        .unwrap();
        assert_eq!(by_name[0].name, "second");

        let by_tag = select(
            scenarios.clone(),
            &Selection {
                names: vec![],
                tags: vec!["nav".to_string()],
            },
        )
        .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "first");

        let unknown = select(
            scenarios.clone(),
            &Selection {
                names: vec!["missing".to_string()],
                tags: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(unknown, Error::UnknownScenario(_)));

        let empty = select(
            scenarios,
            &Selection {
                names: vec![],
                tags: vec!["nothing".to_string()],
            },
        )
        .unwrap_err();
        assert!(empty.is_configuration());
    }

    #[test]
    fn test_load_directory_sorted_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: b\nsteps:\n  - action: navigate\n    url: https://b.test/\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: a\nsteps:\n  - action: navigate\n    url: https://a.test/\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = load_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        std::fs::write(
            dir.path().join("c.yaml"),
            "name: a\nsteps:\n  - action: navigate\n    url: https://c.test/\n",
        )
        .unwrap();
        let err = load_paths(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("duplicate scenario name 'a'"));
    }

    #[test]
    fn test_missing_path_is_config_error() {
        let err = load_paths(&[PathBuf::from("/definitely/not/here")]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_shipped_scenarios_load() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let scenarios = load_paths(&[dir]).unwrap();

        let docs: Vec<_> = scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == "docs"))
            .collect();
        assert_eq!(docs.len(), 6);

        let txdps: Vec<_> = scenarios
            .iter()
            .filter(|s| s.name.starts_with("TC"))
            .collect();
        assert_eq!(txdps.len(), 21);
        assert!(txdps.iter().all(|s| s.setup.len() == 1));

        let gated: Vec<_> = txdps.iter().filter(|s| !s.requires.is_empty()).collect();
        assert_eq!(gated.len(), 8);
        assert!(gated.iter().all(|s| {
            let n: u32 = s.name[2..5].parse().unwrap();
            (8..=15).contains(&n)
        }));
    }
}
