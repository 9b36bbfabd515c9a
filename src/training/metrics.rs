//! Per-category evaluation of the fitted classifier.
//!
//! Counts are kept per label, and every ratio is guarded: an empty
//! denominator scores 0 rather than NaN.

use ndarray::ArrayView2;

/// ラベル単位の混同カウント。
#[derive(Debug, Clone, Copy, Default)]
struct LabelStats {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    support: usize,
}

impl LabelStats {
    fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub categories: Vec<CategoryReport>,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    /// Fraction of rows where every category matched.
    pub subset_accuracy: f64,
}

/// Scores predictions against {0,1} truth, one report line per category.
///
/// # Panics
/// Panics if the shapes of `truth`, `predictions`, and `names` disagree;
/// callers produce all three from the same dataset.
#[must_use]
pub fn evaluate(
    truth: ArrayView2<'_, f32>,
    predictions: ArrayView2<'_, i64>,
    names: &[String],
) -> EvaluationReport {
    assert_eq!(truth.dim(), predictions.dim(), "shape mismatch");
    assert_eq!(truth.ncols(), names.len(), "category count mismatch");

    let mut stats = vec![LabelStats::default(); names.len()];
    let mut exact_rows = 0usize;
    for row in 0..truth.nrows() {
        let mut row_exact = true;
        for (column, stat) in stats.iter_mut().enumerate() {
            let actual = truth[[row, column]] >= 0.5;
            let predicted = predictions[[row, column]] == 1;
            if actual {
                stat.support += 1;
            }
            match (actual, predicted) {
                (true, true) => stat.true_positive += 1,
                (false, true) => stat.false_positive += 1,
                (true, false) => stat.false_negative += 1,
                (false, false) => {}
            }
            if actual != predicted {
                row_exact = false;
            }
        }
        if row_exact {
            exact_rows += 1;
        }
    }

    let categories: Vec<CategoryReport> = names
        .iter()
        .zip(&stats)
        .map(|(name, stat)| CategoryReport {
            name: name.clone(),
            precision: stat.precision(),
            recall: stat.recall(),
            f1: stat.f1(),
            support: stat.support,
        })
        .collect();

    let n = categories.len().max(1) as f64;
    EvaluationReport {
        macro_precision: categories.iter().map(|c| c.precision).sum::<f64>() / n,
        macro_recall: categories.iter().map(|c| c.recall).sum::<f64>() / n,
        macro_f1: categories.iter().map(|c| c.f1).sum::<f64>() / n,
        subset_accuracy: ratio(exact_rows, truth.nrows()),
        categories,
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<24} {:>9} {:>9} {:>9} {:>9}",
            "category", "precision", "recall", "f1", "support"
        )?;
        for report in &self.categories {
            writeln!(
                f,
                "{:<24} {:>9.3} {:>9.3} {:>9.3} {:>9}",
                report.name, report.precision, report.recall, report.f1, report.support
            )?;
        }
        writeln!(
            f,
            "{:<24} {:>9.3} {:>9.3} {:>9.3}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1
        )?;
        write!(f, "subset accuracy: {:.3}", self.subset_accuracy)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn perfect_predictions_score_one_everywhere() {
        let truth = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let predictions = array![[1, 0], [0, 1], [1, 1]];
        let report = evaluate(truth.view(), predictions.view(), &names(&["a", "b"]));

        assert_eq!(report.macro_f1, 1.0);
        assert_eq!(report.subset_accuracy, 1.0);
        assert_eq!(report.categories[0].support, 2);
        assert_eq!(report.categories[1].support, 2);
    }

    #[test]
    fn known_confusion_counts_produce_expected_scores() {
        // category "a": tp=1, fp=1, fn=1 → p=0.5, r=0.5, f1=0.5
        let truth = array![[1.0], [1.0], [0.0], [0.0]];
        let predictions = array![[1], [0], [1], [0]];
        let report = evaluate(truth.view(), predictions.view(), &names(&["a"]));

        let a = &report.categories[0];
        assert!((a.precision - 0.5).abs() < 1e-9);
        assert!((a.recall - 0.5).abs() < 1e-9);
        assert!((a.f1 - 0.5).abs() < 1e-9);
        assert_eq!(a.support, 2);
        assert!((report.subset_accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_denominators_score_zero_not_nan() {
        // never predicted, never present
        let truth = array![[0.0], [0.0]];
        let predictions = array![[0], [0]];
        let report = evaluate(truth.view(), predictions.view(), &names(&["a"]));

        assert_eq!(report.categories[0].precision, 0.0);
        assert_eq!(report.categories[0].recall, 0.0);
        assert_eq!(report.categories[0].f1, 0.0);
        assert!(!report.macro_f1.is_nan());
    }

    #[test]
    fn report_renders_one_line_per_category() {
        let truth = array![[1.0, 0.0]];
        let predictions = array![[1, 0]];
        let report = evaluate(truth.view(), predictions.view(), &names(&["related", "request"]));
        let rendered = report.to_string();

        assert!(rendered.contains("related"));
        assert!(rendered.contains("request"));
        assert!(rendered.contains("subset accuracy"));
    }
}
