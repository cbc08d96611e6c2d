//! # Evaluation Metrics
//!
//! Token accuracy plus per-tag precision/recall/F1 and the micro-averaged
//! F1 used as the optimization target during search. The unknown slot and
//! the outside tag are excluded from the micro average; accuracy counts
//! every token.

use std::fmt;

use etiket_core::error::Result;
use etiket_core::model::SequenceTagger;
use etiket_core::tags::TagDictionary;
use etiket_core::Sentence;

/// Confusion counts and derived scores for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMetrics {
    pub tag: String,
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl TagMetrics {
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

/// Full evaluation result, rendered into `evaluation.txt`.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub micro_f1: f64,
    pub per_tag: Vec<TagMetrics>,
    pub tokens: usize,
    pub sentences: usize,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "evaluated {} sentences / {} tokens",
            self.sentences, self.tokens
        )?;
        writeln!(f, "accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "micro-F1: {:.4}", self.micro_f1)?;
        writeln!(f)?;
        for m in &self.per_tag {
            writeln!(
                f,
                "{:<12} tp: {:<6} fp: {:<6} fn: {:<6} precision: {:.4}  recall: {:.4}  f1: {:.4}",
                m.tag,
                m.tp,
                m.fp,
                m.fn_,
                m.precision(),
                m.recall(),
                m.f1()
            )?;
        }
        Ok(())
    }
}

/// Tags that never enter the micro average.
fn excluded_from_average(tag: &str) -> bool {
    tag == etiket_core::UNK_TAG || tag == "O"
}

/// Run inference over a split and score predictions against gold labels.
///
/// Gold labels absent from the dictionary are mapped to the unknown slot,
/// never expanding the dictionary or indexing out of bounds.
pub fn evaluate(
    tagger: &SequenceTagger,
    split: &[Sentence],
    dictionary: &TagDictionary,
) -> Result<EvaluationReport> {
    let num_tags = dictionary.len();
    let mut tp = vec![0usize; num_tags];
    let mut fp = vec![0usize; num_tags];
    let mut fn_ = vec![0usize; num_tags];
    let mut correct = 0usize;
    let mut tokens = 0usize;

    for sentence in split {
        let predicted = tagger.predict(&sentence.tokens)?;
        for (pos, label) in sentence.labels.iter().enumerate() {
            let gold = dictionary.index_or_unk(label);
            let pred = predicted[pos];
            tokens += 1;
            if pred == gold {
                correct += 1;
                tp[gold] += 1;
            } else {
                fp[pred] += 1;
                fn_[gold] += 1;
            }
        }
    }

    let per_tag: Vec<TagMetrics> = (0..num_tags)
        .map(|idx| TagMetrics {
            tag: dictionary.tag_at(idx).unwrap_or("?").to_string(),
            tp: tp[idx],
            fp: fp[idx],
            fn_: fn_[idx],
        })
        .collect();

    let (mut micro_tp, mut micro_fp, mut micro_fn) = (0usize, 0usize, 0usize);
    for m in &per_tag {
        if excluded_from_average(&m.tag) {
            continue;
        }
        micro_tp += m.tp;
        micro_fp += m.fp;
        micro_fn += m.fn_;
    }
    let micro_p = ratio(micro_tp, micro_tp + micro_fp);
    let micro_r = ratio(micro_tp, micro_tp + micro_fn);
    let micro_f1 = if micro_p + micro_r == 0.0 {
        0.0
    } else {
        2.0 * micro_p * micro_r / (micro_p + micro_r)
    };

    Ok(EvaluationReport {
        accuracy: ratio(correct, tokens),
        micro_f1,
        per_tag,
        tokens,
        sentences: split.len(),
    })
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiket_core::model::{EmbeddingType, TaggerConfig};

    fn sentence(tokens: &[&str], labels: &[&str]) -> Sentence {
        Sentence::new(
            tokens.iter().map(|s| s.to_string()).collect(),
            labels.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn perfect_tag_metrics() {
        let m = TagMetrics {
            tag: "B-PER".into(),
            tp: 10,
            fp: 0,
            fn_: 0,
        };
        assert_eq!(m.precision(), 1.0);
        assert_eq!(m.recall(), 1.0);
        assert_eq!(m.f1(), 1.0);
    }

    #[test]
    fn zero_counts_do_not_divide_by_zero() {
        let m = TagMetrics {
            tag: "B-LOC".into(),
            tp: 0,
            fp: 0,
            fn_: 0,
        };
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.f1(), 0.0);
    }

    #[test]
    fn untrained_model_evaluates_without_error() {
        let dict = TagDictionary::from_labels(["O", "B-PER"]);
        let tagger = SequenceTagger::new(TaggerConfig::new(EmbeddingType::Char), &dict).unwrap();
        let split = vec![sentence(&["Ali", "geldi"], &["B-PER", "O"])];

        let report = evaluate(&tagger, &split, &dict).unwrap();
        assert_eq!(report.tokens, 2);
        assert!(report.accuracy >= 0.0 && report.accuracy <= 1.0);
    }

    #[test]
    fn unseen_gold_labels_map_to_unk() {
        let dict = TagDictionary::from_labels(["O", "B-PER"]);
        let tagger = SequenceTagger::new(TaggerConfig::new(EmbeddingType::Char), &dict).unwrap();
        // B-ORG was never in the dictionary.
        let split = vec![sentence(&["Acme"], &["B-ORG"])];

        let report = evaluate(&tagger, &split, &dict).unwrap();
        assert_eq!(report.tokens, 1);
        // The unknown slot accumulated the miss, not a panic.
        let unk = &report.per_tag[0];
        assert_eq!(unk.tag, etiket_core::UNK_TAG);
    }

    #[test]
    fn report_renders_all_tags() {
        let dict = TagDictionary::from_labels(["O", "B-PER"]);
        let tagger = SequenceTagger::new(TaggerConfig::new(EmbeddingType::Char), &dict).unwrap();
        let split = vec![sentence(&["Ali"], &["B-PER"])];
        let report = evaluate(&tagger, &split, &dict).unwrap();
        let rendered = report.to_string();
        assert!(rendered.contains("accuracy"));
        assert!(rendered.contains("B-PER"));
    }
}
