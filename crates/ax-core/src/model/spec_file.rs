//! Model-definition file parser.
//!
//! The text format has a metadata header and one named block per
//! factor:
//!
//! ```text
//! # corridor world
//! [metadata]
//! name = corridor
//! version = 1.0.0
//! dimensions = 4 3 2
//! tags = demo, corridor
//!
//! [A]
//! 0.9 0.1 0.0 0.34
//! 0.1 0.8 0.1 0.33
//! 0.0 0.1 0.9 0.33
//!
//! [B]
//! # one S x S block per action, row-major
//! ...
//!
//! [C]
//! # O rows, one column per horizon step (optional, default zero)
//!
//! [D]
//! 0.25 0.25 0.25 0.25
//! ```
//!
//! `#` starts a comment. Parse failures surface the line and column of
//! the offending token.

use std::collections::BTreeMap;
use std::path::Path;

use ax_common::{Error, Result};
use ax_math::{uniform, Matrix, Tensor3};

use super::discrete::{Dimensions, DiscreteModel};

/// A parsed model definition: metadata plus a validated model.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    pub name: String,
    pub version: String,
    pub tags: Vec<String>,
    pub dims: Dimensions,
    pub model: DiscreteModel,
}

/// Parse a model definition from a file path.
pub fn load_model_file(path: &Path) -> Result<ModelDefinition> {
    let text = std::fs::read_to_string(path)?;
    parse_model_file(&text)
}

/// Parse a model definition from text.
pub fn parse_model_file(text: &str) -> Result<ModelDefinition> {
    let sections = split_sections(text)?;

    let metadata = sections
        .get("metadata")
        .ok_or_else(|| parse_err(1, 1, "missing [metadata] section"))?;
    let meta = parse_metadata(metadata)?;

    let a_lines = sections
        .get("A")
        .ok_or_else(|| parse_err(1, 1, "missing [A] section"))?;
    let b_lines = sections
        .get("B")
        .ok_or_else(|| parse_err(1, 1, "missing [B] section"))?;

    let dims = meta.dims;
    let a = parse_matrix(a_lines, dims.observations, dims.states, "A")?;
    let b = parse_transition(b_lines, dims)?;

    let c = match sections.get("C") {
        Some(lines) => {
            let rows = numeric_rows(lines)?;
            let horizon = rows.first().map(|(_, r)| r.len()).unwrap_or(1);
            rows_to_matrix(&rows, dims.observations, horizon, "C")?
        }
        None => Matrix::zeros(dims.observations, 1),
    };

    let d = match sections.get("D") {
        Some(lines) => {
            let rows = numeric_rows(lines)?;
            let m = rows_to_matrix(&rows, 1, dims.states, "D")?;
            m.row(0).to_vec()
        }
        None => uniform(dims.states),
    };

    let model = DiscreteModel::from_parts(dims, a, b, c, d)?;
    Ok(ModelDefinition {
        name: meta.name,
        version: meta.version,
        tags: meta.tags,
        dims,
        model,
    })
}

struct Metadata {
    name: String,
    version: String,
    tags: Vec<String>,
    dims: Dimensions,
}

/// One source line with its 1-based line number.
type NumberedLine<'a> = (usize, &'a str);

fn parse_err(line: usize, column: usize, reason: impl Into<String>) -> Error {
    Error::Parse {
        line,
        column,
        reason: reason.into(),
    }
}

/// Strip comments, split into `[section]`-headed groups of lines.
fn split_sections(text: &str) -> Result<BTreeMap<String, Vec<NumberedLine<'_>>>> {
    let mut sections: BTreeMap<String, Vec<NumberedLine<'_>>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| {
                parse_err(line_no, trimmed.len(), "unterminated section header")
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(parse_err(line_no, 2, "empty section name"));
            }
            if sections.contains_key(name) {
                return Err(parse_err(line_no, 1, format!("duplicate section [{name}]")));
            }
            sections.insert(name.to_string(), Vec::new());
            current = Some(name.to_string());
            continue;
        }
        let section = current.as_ref().ok_or_else(|| {
            parse_err(line_no, 1, "content before the first section header")
        })?;
        sections
            .get_mut(section)
            .expect("section inserted above")
            .push((line_no, line));
    }
    Ok(sections)
}

fn parse_metadata(lines: &[NumberedLine<'_>]) -> Result<Metadata> {
    let mut name = None;
    let mut version = None;
    let mut tags = Vec::new();
    let mut dims = None;

    for &(line_no, line) in lines {
        let eq = line
            .find('=')
            .ok_or_else(|| parse_err(line_no, 1, "expected `key = value`"))?;
        let key = line[..eq].trim();
        let value = line[eq + 1..].trim();
        let value_col = eq + 2;
        if value.is_empty() {
            return Err(parse_err(line_no, value_col, format!("empty value for `{key}`")));
        }
        match key {
            "name" => name = Some(value.to_string()),
            "version" => version = Some(value.to_string()),
            "tags" => {
                tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            "dimensions" => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 3 {
                    return Err(parse_err(
                        line_no,
                        value_col,
                        "dimensions must be three integers: S O U",
                    ));
                }
                let mut parsed = [0usize; 3];
                for (i, p) in parts.iter().enumerate() {
                    parsed[i] = p.parse().map_err(|_| {
                        parse_err(line_no, value_col, format!("`{p}` is not an integer"))
                    })?;
                }
                dims = Some(
                    Dimensions::new(parsed[0], parsed[1], parsed[2])
                        .map_err(|e| parse_err(line_no, value_col, e.to_string()))?,
                );
            }
            other => {
                return Err(parse_err(line_no, 1, format!("unknown metadata key `{other}`")));
            }
        }
    }

    Ok(Metadata {
        name: name.ok_or_else(|| parse_err(1, 1, "metadata missing `name`"))?,
        version: version.ok_or_else(|| parse_err(1, 1, "metadata missing `version`"))?,
        tags,
        dims: dims.ok_or_else(|| parse_err(1, 1, "metadata missing `dimensions`"))?,
    })
}

/// Parse every non-empty line into numbers, keeping line numbers.
fn numeric_rows(lines: &[NumberedLine<'_>]) -> Result<Vec<(usize, Vec<f64>)>> {
    let mut rows = Vec::new();
    for &(line_no, line) in lines {
        let mut row = Vec::new();
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                // Column of the token within the raw line.
                let col = line[..line.find(token).unwrap_or(0)].chars().count() + 1;
                parse_err(line_no, col, format!("`{token}` is not a number"))
            })?;
            row.push(value);
        }
        if !row.is_empty() {
            rows.push((line_no, row));
        }
    }
    Ok(rows)
}

fn rows_to_matrix(
    rows: &[(usize, Vec<f64>)],
    expect_rows: usize,
    expect_cols: usize,
    block: &str,
) -> Result<Matrix> {
    if rows.len() != expect_rows {
        let line = rows.last().map(|(l, _)| *l).unwrap_or(1);
        return Err(parse_err(
            line,
            1,
            format!("[{block}] needs {expect_rows} rows, found {}", rows.len()),
        ));
    }
    let mut data = Vec::with_capacity(expect_rows * expect_cols);
    for (line_no, row) in rows {
        if row.len() != expect_cols {
            return Err(parse_err(
                *line_no,
                1,
                format!("[{block}] row needs {expect_cols} values, found {}", row.len()),
            ));
        }
        data.extend_from_slice(row);
    }
    Matrix::from_row_major(expect_rows, expect_cols, data)
        .ok_or_else(|| parse_err(1, 1, format!("[{block}] block is empty")))
}

fn parse_matrix(
    lines: &[NumberedLine<'_>],
    rows: usize,
    cols: usize,
    block: &str,
) -> Result<Matrix> {
    let numeric = numeric_rows(lines)?;
    rows_to_matrix(&numeric, rows, cols, block)
}

/// `[B]` holds one `S x S` block per action, row-major, action-major.
fn parse_transition(lines: &[NumberedLine<'_>], dims: Dimensions) -> Result<Tensor3> {
    let rows = numeric_rows(lines)?;
    let expected = dims.states * dims.actions;
    if rows.len() != expected {
        let line = rows.last().map(|(l, _)| *l).unwrap_or(1);
        return Err(parse_err(
            line,
            1,
            format!(
                "[B] needs {expected} rows ({} states x {} actions), found {}",
                dims.states,
                dims.actions,
                rows.len()
            ),
        ));
    }
    let mut slices = Vec::with_capacity(dims.actions);
    for u in 0..dims.actions {
        let chunk = &rows[u * dims.states..(u + 1) * dims.states];
        slices.push(rows_to_matrix(chunk, dims.states, dims.states, "B")?);
    }
    Tensor3::from_slices(slices).ok_or_else(|| parse_err(1, 1, "[B] block is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = r#"
# two-action corridor
[metadata]
name = corridor
version = 1.0.0
dimensions = 3 2 2
tags = demo, corridor

[A]
0.9 0.1 0.5
0.1 0.9 0.5

[B]
# action 0: stay
1 0 0
0 1 0
0 0 1
# action 1: shift right
0 0 0
1 0 0
0 1 1

[C]
0.8 0.8
0.2 0.2

[D]
0.5 0.3 0.2
"#;

    #[test]
    fn parses_complete_definition() {
        let def = parse_model_file(CORRIDOR).unwrap();
        assert_eq!(def.name, "corridor");
        assert_eq!(def.tags, vec!["demo", "corridor"]);
        assert_eq!(def.dims.states, 3);
        assert_eq!(def.model.horizon(), 2);
        assert!((def.model.d()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn omitted_c_and_d_use_defaults() {
        let text = CORRIDOR
            .split("[C]")
            .next()
            .unwrap()
            .to_string();
        let def = parse_model_file(&text).unwrap();
        assert_eq!(def.model.preference(0, 0), 0.0);
        assert!((def.model.d()[0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn bad_number_reports_line_and_column() {
        let text = CORRIDOR.replace("0.9 0.1 0.5", "0.9 oops 0.5");
        match parse_model_file(&text).unwrap_err() {
            Error::Parse { line, column, reason } => {
                assert_eq!(line, 10);
                assert_eq!(column, 5);
                assert!(reason.contains("oops"));
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn wrong_row_count_is_reported() {
        let text = CORRIDOR.replace("0.1 0.9 0.5\n", "");
        let err = parse_model_file(&text).unwrap_err();
        assert!(err.to_string().contains("[A] needs 2 rows"));
    }

    #[test]
    fn missing_metadata_key_fails() {
        let text = CORRIDOR.replace("version = 1.0.0\n", "");
        let err = parse_model_file(&text).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn non_stochastic_block_fails_validation() {
        let text = CORRIDOR.replace("0.5 0.3 0.2", "0.5 0.3 0.9");
        let err = parse_model_file(&text).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
    }

    #[test]
    fn duplicate_section_is_rejected() {
        let text = format!("{CORRIDOR}\n[A]\n0.9 0.1 0.5\n0.1 0.9 0.5\n");
        let err = parse_model_file(&text).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
