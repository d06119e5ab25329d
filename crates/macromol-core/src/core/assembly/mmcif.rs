use super::{AssemblyError, Bioassembly, Transformation};
use crate::core::io::mmcif::CifDict;
use nalgebra::{Matrix3, Vector3};
use tracing::warn;

/// Builds a [`Bioassembly`] from the `_pdbx_struct_assembly_gen` and
/// `_pdbx_struct_oper_list` categories of a flat mmCIF dictionary.
///
/// The generation row names the chains (asym id list) and the operator
/// ids; each operator row carries its rotation matrix and translation
/// vector as scalar components addressed by explicit (row, column)
/// indices.
pub fn bioassembly_from_dict(
    dict: &CifDict,
    assembly_id: &str,
) -> Result<Bioassembly, AssemblyError> {
    let assembly_ids = column(dict, "_pdbx_struct_assembly_gen.assembly_id").ok_or_else(|| {
        AssemblyError::NotFound {
            id: assembly_id.to_string(),
        }
    })?;

    let matches: Vec<usize> = assembly_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| id.as_str() == assembly_id)
        .map(|(row, _)| row)
        .collect();
    let row = match matches.as_slice() {
        [] => {
            return Err(AssemblyError::NotFound {
                id: assembly_id.to_string(),
            });
        }
        [row] => *row,
        [row, ..] => {
            warn!(
                assembly = assembly_id,
                rows = matches.len(),
                "assembly spans multiple generation rows; using the first"
            );
            *row
        }
    };

    let chain_ids: Vec<String> =
        field(dict, "_pdbx_struct_assembly_gen.asym_id_list", row)?
            .split(',')
            .map(str::trim)
            .filter(|chain| !chain.is_empty())
            .map(str::to_string)
            .collect();

    let expression = field(dict, "_pdbx_struct_assembly_gen.oper_expression", row)?;
    let operator_ids = expand_oper_expression(expression)?;

    let mut transformations = Vec::with_capacity(operator_ids.len());
    for operator_id in &operator_ids {
        transformations.push(operator_from_dict(dict, operator_id)?);
    }

    Ok(Bioassembly {
        id: assembly_id.to_string(),
        chain_ids,
        transformations,
    })
}

/// Expands an `oper_expression` into individual operator ids: plain ids,
/// comma-separated lists, and parenthesized `a-b` numeric ranges.
/// Composite cartesian expressions (`(1-60)(61-88)`) are not supported.
fn expand_oper_expression(expression: &str) -> Result<Vec<String>, AssemblyError> {
    let trimmed = expression.trim();
    if trimmed.contains(")(") {
        return Err(AssemblyError::BadOperator {
            item: "_pdbx_struct_assembly_gen.oper_expression".to_string(),
            value: expression.to_string(),
        });
    }
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut ids = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (
                    start.trim().parse::<i64>(),
                    end.trim().parse::<i64>(),
                );
                match (start, end) {
                    (Ok(start), Ok(end)) if start <= end => {
                        ids.extend((start..=end).map(|id| id.to_string()));
                    }
                    _ => {
                        return Err(AssemblyError::BadOperator {
                            item: "_pdbx_struct_assembly_gen.oper_expression".to_string(),
                            value: part.to_string(),
                        });
                    }
                }
            }
            None => ids.push(part.to_string()),
        }
    }
    Ok(ids)
}

fn operator_from_dict(dict: &CifDict, operator_id: &str) -> Result<Transformation, AssemblyError> {
    let ids = column(dict, "_pdbx_struct_oper_list.id").ok_or_else(|| {
        AssemblyError::OperatorNotFound {
            id: operator_id.to_string(),
        }
    })?;
    let row = ids
        .iter()
        .position(|id| id == operator_id)
        .ok_or_else(|| AssemblyError::OperatorNotFound {
            id: operator_id.to_string(),
        })?;

    let mut rotation = Matrix3::zeros();
    for r in 1..=3 {
        for c in 1..=3 {
            let item = format!("_pdbx_struct_oper_list.matrix[{r}][{c}]");
            rotation[(r - 1, c - 1)] = numeric_field(dict, &item, row)?;
        }
    }
    let mut translation = Vector3::zeros();
    for r in 1..=3 {
        let item = format!("_pdbx_struct_oper_list.vector[{r}]");
        translation[r - 1] = numeric_field(dict, &item, row)?;
    }
    Ok(Transformation::new(rotation, translation))
}

fn column<'d>(dict: &'d CifDict, item: &str) -> Option<&'d [String]> {
    dict.get(item).map(|value| value.as_slice())
}

fn field<'d>(dict: &'d CifDict, item: &str, row: usize) -> Result<&'d str, AssemblyError> {
    column(dict, item)
        .and_then(|values| values.get(row))
        .map(String::as_str)
        .ok_or_else(|| AssemblyError::BadOperator {
            item: item.to_string(),
            value: format!("<missing row {row}>"),
        })
}

fn numeric_field(dict: &CifDict, item: &str, row: usize) -> Result<f64, AssemblyError> {
    let raw = field(dict, item, row)?;
    raw.parse::<f64>().map_err(|_| AssemblyError::BadOperator {
        item: item.to_string(),
        value: raw.to_string(),
    })
}
