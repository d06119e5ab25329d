use super::{AssemblyError, Bioassembly, Transformation};
use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;

/// State machine for legacy `REMARK 350` biological-assembly records.
///
/// Tracks the current biomolecule number, the "APPLY THE FOLLOWING TO
/// CHAINS" list, and sequential BIOMT1/2/3 triples that together form one
/// rotation matrix and translation vector per operator. A new
/// `BIOMOLECULE:` line flushes the accumulated state for the previous
/// biomolecule and starts a new one.
///
/// Every line handed to the parser must carry the exact `REMARK 350 `
/// prefix; anything else is a fatal parse error.
#[derive(Debug, Default)]
pub struct Remark350Parser {
    current: Option<PendingAssembly>,
    assemblies: HashMap<String, Bioassembly>,
    lines_seen: usize,
}

#[derive(Debug)]
struct PendingAssembly {
    id: String,
    chain_ids: Vec<String>,
    transformations: Vec<Transformation>,
    partial: Option<PartialOperator>,
}

/// An operator whose BIOMT rows have not all arrived yet.
#[derive(Debug)]
struct PartialOperator {
    rows_done: usize,
    matrix: [[f64; 3]; 3],
    vector: [f64; 3],
}

impl Remark350Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw remark lines, in file order. May be called repeatedly.
    pub fn process_lines<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), AssemblyError> {
        for line in lines {
            self.lines_seen += 1;
            self.process_line(line, self.lines_seen)?;
        }
        Ok(())
    }

    /// Flushes the final biomolecule and returns the accumulated
    /// assemblies keyed by biomolecule number.
    pub fn finish(mut self) -> Result<HashMap<String, Bioassembly>, AssemblyError> {
        self.flush()?;
        Ok(self.assemblies)
    }

    fn process_line(&mut self, line: &str, line_no: usize) -> Result<(), AssemblyError> {
        let content = match line.strip_prefix("REMARK 350 ") {
            Some(content) => content.trim(),
            None if line.trim_end() == "REMARK 350" => "",
            None => return Err(AssemblyError::BadRemarkPrefix { line: line_no }),
        };

        if let Some(rest) = content.strip_prefix("BIOMOLECULE:") {
            self.flush()?;
            self.current = Some(PendingAssembly {
                id: rest.trim().to_string(),
                chain_ids: Vec::new(),
                transformations: Vec::new(),
                partial: None,
            });
            return Ok(());
        }

        if let Some(rest) = content
            .strip_prefix("APPLY THE FOLLOWING TO CHAINS:")
            .or_else(|| content.strip_prefix("AND CHAINS:"))
        {
            let Some(pending) = self.current.as_mut() else {
                return Err(AssemblyError::MalformedRemark {
                    line: line_no,
                    message: "chain list before any BIOMOLECULE record".to_string(),
                });
            };
            pending.chain_ids.extend(
                rest.split(',')
                    .map(str::trim)
                    .filter(|chain| !chain.is_empty())
                    .map(str::to_string),
            );
            return Ok(());
        }

        if let Some(rest) = content.strip_prefix("BIOMT") {
            return self.process_biomt(rest, line_no);
        }

        // Free-text remark lines carry no assembly data.
        Ok(())
    }

    /// One `BIOMTn  opserial  m1 m2 m3  v` row. Row n supplies row n of
    /// the rotation matrix and component n of the translation vector;
    /// rows must arrive in 1, 2, 3 order.
    fn process_biomt(&mut self, rest: &str, line_no: usize) -> Result<(), AssemblyError> {
        let malformed = |message: &str| AssemblyError::MalformedRemark {
            line: line_no,
            message: message.to_string(),
        };

        let mut fields = rest.split_whitespace();
        let row: usize = fields
            .next()
            .and_then(|field| field.parse().ok())
            .filter(|row| (1..=3).contains(row))
            .ok_or_else(|| malformed("BIOMT row index must be 1, 2 or 3"))?;
        let _operator_serial = fields
            .next()
            .ok_or_else(|| malformed("BIOMT row is missing the operator serial"))?;
        let mut values = [0.0f64; 4];
        for slot in values.iter_mut() {
            *slot = fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| malformed("BIOMT row must carry three matrix components and one vector component"))?;
        }

        let Some(pending) = self.current.as_mut() else {
            return Err(malformed("BIOMT row before any BIOMOLECULE record"));
        };

        if row == 1 {
            if pending.partial.is_some() {
                return Err(malformed("BIOMT1 before the previous operator completed"));
            }
            pending.partial = Some(PartialOperator {
                rows_done: 0,
                matrix: [[0.0; 3]; 3],
                vector: [0.0; 3],
            });
        }
        let Some(partial) = pending.partial.as_mut() else {
            return Err(malformed("BIOMT rows must start with BIOMT1"));
        };
        if partial.rows_done + 1 != row {
            return Err(malformed("BIOMT rows must arrive in 1, 2, 3 order"));
        }

        partial.matrix[row - 1] = [values[0], values[1], values[2]];
        partial.vector[row - 1] = values[3];
        partial.rows_done = row;

        if row == 3 {
            let complete = pending.partial.take().unwrap();
            // Addressed by explicit (row, column) indices to rule out
            // transposition.
            let mut rotation = Matrix3::zeros();
            for r in 0..3 {
                for c in 0..3 {
                    rotation[(r, c)] = complete.matrix[r][c];
                }
            }
            let translation =
                Vector3::new(complete.vector[0], complete.vector[1], complete.vector[2]);
            pending
                .transformations
                .push(Transformation::new(rotation, translation));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AssemblyError> {
        let Some(pending) = self.current.take() else {
            return Ok(());
        };
        if pending.partial.is_some() {
            return Err(AssemblyError::IncompleteRemark {
                id: pending.id,
                message: "last BIOMT operator is missing rows".to_string(),
            });
        }
        if pending.chain_ids.is_empty() {
            return Err(AssemblyError::IncompleteRemark {
                id: pending.id,
                message: "no APPLY THE FOLLOWING TO CHAINS record".to_string(),
            });
        }
        if pending.transformations.is_empty() {
            return Err(AssemblyError::IncompleteRemark {
                id: pending.id,
                message: "no BIOMT operators".to_string(),
            });
        }
        if self.assemblies.contains_key(&pending.id) {
            return Err(AssemblyError::DuplicateAssembly { id: pending.id });
        }
        self.assemblies.insert(
            pending.id.clone(),
            Bioassembly {
                id: pending.id,
                chain_ids: pending.chain_ids,
                transformations: pending.transformations,
            },
        );
        Ok(())
    }
}

/// Parses a complete set of REMARK 350 lines in one call.
pub fn parse_remark_350<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, Bioassembly>, AssemblyError> {
    let mut parser = Remark350Parser::new();
    parser.process_lines(lines)?;
    parser.finish()
}
