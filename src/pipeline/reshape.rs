//! Column reshaping: drop, rename, rescale, one-hot expand.

use crate::domain::{ParameterBundle, RecordFrame};

use super::PipelineError;

/// Column name of a one-hot branch.
///
/// Integral codes keep one decimal (`smoking_2.0`), matching the names the
/// training frame produced from its float-typed survey columns.
#[must_use]
pub fn one_hot_name(column: &str, value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{column}_{value:.1}")
    } else {
        format!("{column}_{value}")
    }
}

/// Turn a resolved raw frame into the model's named feature columns.
///
/// # Errors
/// `ConfigIntegrity` when a scaled or categorical column does not exist
/// after renaming.
pub fn reshape(
    mut frame: RecordFrame,
    bundle: &ParameterBundle,
) -> Result<RecordFrame, PipelineError> {
    for column in &bundle.drop_columns {
        frame.remove(column);
    }

    frame.rename_columns(&bundle.rename_table);

    for (index, column) in bundle.scale_columns.iter().enumerate() {
        let Some(cell) = frame.cell(column) else {
            tracing::error!(column = %column, "scaled column missing after rename");
            return Err(PipelineError::ConfigIntegrity(format!(
                "scale column {column} not present after rename"
            )));
        };
        frame.set(
            column.as_str(),
            cell.map(|x| bundle.scaler.transform(index, x)),
        );
    }

    for column in &bundle.categorical_columns {
        let Some(cell) = frame.remove(column) else {
            tracing::error!(column = %column, "categorical column missing after rename");
            return Err(PipelineError::ConfigIntegrity(format!(
                "categorical column {column} not present after rename"
            )));
        };
        // A missing category contributes no branch; the aligner zero-fills them all.
        if let Some(value) = cell {
            frame.set(one_hot_name(column, value), Some(1.0));
        }
    }

    Ok(frame)
}
