//! Point-wise regression errors of predictions, computed through `linfa` regression metrics

use linfa::Float;
use linfa::metrics::SingleTargetRegression;
use ndarray::{ArrayBase, Data, Ix1};

use crate::errors::{GpError, Result};

fn check_lengths<F: Float>(
    pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
    truth: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<()> {
    if pred.is_empty() {
        return Err(GpError::InvalidValueError(
            "Cannot compute metric of empty predictions".to_string(),
        ));
    }
    if pred.len() != truth.len() {
        return Err(GpError::InvalidValueError(format!(
            "Predictions ({}) and targets ({}) lengths differ",
            pred.len(),
            truth.len()
        )));
    }
    Ok(())
}

/// Mean absolute error `mean(|pred - truth|)`
pub fn mean_absolute_error<F: Float>(
    pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
    truth: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<F> {
    check_lengths(pred, truth)?;
    Ok(pred.view().mean_absolute_error(&truth.view())?)
}

/// Root mean squared error `sqrt(mean((pred - truth)^2))`
pub fn root_mean_squared_error<F: Float>(
    pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
    truth: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<F> {
    check_lengths(pred, truth)?;
    Ok(pred.view().mean_squared_error(&truth.view())?.sqrt())
}

/// Coefficient of determination `1 - SSres / SStot` of predictions wrt `truth`
pub fn r2_score<F: Float>(
    pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
    truth: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<F> {
    check_lengths(pred, truth)?;
    Ok(pred.view().r2(&truth.view())?)
}
