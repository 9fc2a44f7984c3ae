//! Beam-search decoding over a [`Seq2SeqModel`].

use super::{ModelError, Seq2SeqModel, SpecialTokens};
use std::cmp::Ordering;

/// Decoding parameters for [`beam_search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamParams {
    /// Number of hypotheses kept alive per step.
    pub num_beams: usize,
    /// End-of-sequence is suppressed until the sequence reaches this many tokens.
    pub min_length: usize,
    /// Hard cap on the sequence length, decoder start token included.
    pub max_length: usize,
    /// Exponent applied to the generated length when ranking finished hypotheses.
    pub length_penalty: f32,
    /// Stop as soon as `num_beams` hypotheses have finished.
    pub early_stopping: bool,
}

struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
}

struct Candidate {
    beam: usize,
    token: u32,
    score: f32,
}

/// Best `num_beams` finished hypotheses ranked by length-normalized score.
struct FinishedHypotheses {
    capacity: usize,
    length_penalty: f32,
    entries: Vec<(f32, Vec<u32>)>,
}

impl FinishedHypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            entries: Vec::new(),
        }
    }

    fn normalize(&self, score: f32, generated: usize) -> f32 {
        score / (generated.max(1) as f32).powf(self.length_penalty)
    }

    fn worst(&self) -> f32 {
        self.entries
            .iter()
            .map(|(score, _)| *score)
            .fold(f32::INFINITY, f32::min)
    }

    fn add(&mut self, tokens: Vec<u32>, score: f32) {
        let normalized = self.normalize(score, tokens.len() - 1);
        if self.entries.len() < self.capacity || normalized > self.worst() {
            self.entries.push((normalized, tokens));
            if self.entries.len() > self.capacity {
                let worst = self
                    .entries
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.0.total_cmp(&b.1.0).then(b.0.cmp(&a.0)))
                    .map(|(index, _)| index);
                if let Some(index) = worst {
                    self.entries.remove(index);
                }
            }
        }
    }

    fn is_done(&self, best_live_score: f32, cur_len: usize, early_stopping: bool) -> bool {
        if self.entries.len() < self.capacity {
            return false;
        }
        if early_stopping {
            return true;
        }
        self.normalize(best_live_score, cur_len - 1) <= self.worst()
    }

    fn into_best(self) -> Option<Vec<u32>> {
        let mut best: Option<(f32, Vec<u32>)> = None;
        for (score, tokens) in self.entries {
            if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
                best = Some((score, tokens));
            }
        }
        best.map(|(_, tokens)| tokens)
    }
}

/// Run beam search and return the top sequence, decoder start token included.
///
/// The search is deterministic: ties between equal scores are broken by beam index and then by
/// token id. The returned sequence never exceeds `params.max_length` tokens.
pub fn beam_search<M: Seq2SeqModel + ?Sized>(
    model: &mut M,
    encoded: &M::Encoded,
    params: &BeamParams,
) -> Result<Vec<u32>, ModelError> {
    let special = model.special_tokens();
    let num_beams = params.num_beams.max(1);
    let candidates_per_step = num_beams.saturating_mul(2);
    let mut live = vec![Hypothesis {
        tokens: vec![special.decoder_start],
        score: 0.0,
    }];
    let mut finished = FinishedHypotheses::new(num_beams, params.length_penalty);
    let mut done = false;

    while live[0].tokens.len() < params.max_length {
        let cur_len = live[0].tokens.len();
        let prefixes: Vec<Vec<u32>> = live.iter().map(|hyp| hyp.tokens.clone()).collect();
        let logits = model.next_token_logits(encoded, &prefixes)?;
        if logits.len() != live.len() {
            return Err(ModelError::Inference(format!(
                "expected logits for {} beams, got {}",
                live.len(),
                logits.len()
            )));
        }

        let mut candidates = Vec::new();
        for (beam, (hypothesis, row)) in live.iter().zip(&logits).enumerate() {
            let mut log_probs = log_softmax(row);
            constrain(&mut log_probs, cur_len, params, &special);
            for (token, log_prob) in top_k(&log_probs, candidates_per_step) {
                candidates.push(Candidate {
                    beam,
                    token,
                    score: hypothesis.score + log_prob,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.beam.cmp(&b.beam))
                .then(a.token.cmp(&b.token))
        });
        candidates.truncate(candidates_per_step);

        let mut next = Vec::new();
        for (rank, candidate) in candidates.iter().enumerate() {
            let mut tokens = live[candidate.beam].tokens.clone();
            tokens.push(candidate.token);
            if candidate.token == special.eos {
                // Only end-of-sequence tokens ranked inside the beam may finish a hypothesis.
                if rank < num_beams {
                    finished.add(tokens, candidate.score);
                }
            } else {
                next.push(Hypothesis {
                    tokens,
                    score: candidate.score,
                });
            }
            if next.len() == num_beams {
                break;
            }
        }

        let best_live = next
            .iter()
            .map(|hyp| hyp.score)
            .fold(f32::NEG_INFINITY, f32::max);
        if next.is_empty() || finished.is_done(best_live, cur_len + 1, params.early_stopping) {
            done = true;
            break;
        }
        live = next;
    }

    if !done {
        for hypothesis in live {
            finished.add(hypothesis.tokens, hypothesis.score);
        }
    }

    finished
        .into_best()
        .ok_or_else(|| ModelError::Inference("beam search produced no hypotheses".into()))
}

fn constrain(log_probs: &mut [f32], cur_len: usize, params: &BeamParams, special: &SpecialTokens) {
    if cur_len == 1 {
        if let Some(bos) = special.forced_bos {
            force_token(log_probs, bos);
            return;
        }
    }
    if cur_len + 1 == params.max_length {
        if let Some(eos) = special.forced_eos {
            force_token(log_probs, eos);
            return;
        }
    }
    if cur_len < params.min_length {
        if let Some(value) = log_probs.get_mut(special.eos as usize) {
            *value = f32::NEG_INFINITY;
        }
    }
}

fn force_token(log_probs: &mut [f32], token: u32) {
    if (token as usize) >= log_probs.len() {
        return;
    }
    for (index, value) in log_probs.iter_mut().enumerate() {
        *value = if index == token as usize {
            0.0
        } else {
            f32::NEG_INFINITY
        };
    }
}

fn log_softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = row.iter().map(|value| (value - max).exp()).sum();
    let log_norm = max + sum.ln();
    row.iter().map(|value| value - log_norm).collect()
}

fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let by_score = |a: &(u32, f32), b: &(u32, f32)| -> Ordering {
        b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
    };
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .map(|(index, value)| (index as u32, *value))
        .collect();
    if indexed.len() > k {
        indexed.select_nth_unstable_by(k, by_score);
        indexed.truncate(k);
    }
    indexed.sort_by(by_score);
    indexed
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ScriptedModel, VOCAB};
    use super::super::{Device, SpecialTokens};
    use super::*;

    fn params(min_length: usize, max_length: usize) -> BeamParams {
        BeamParams {
            num_beams: 4,
            min_length,
            max_length,
            length_penalty: 2.0,
            early_stopping: true,
        }
    }

    fn source() -> Vec<u32> {
        vec![3, 4, 5, 6, 7, 3, 4, 5, 6, 7, 3, 4]
    }

    /// Always prefers end-of-sequence; counts decoder calls.
    struct EagerEosModel {
        calls: usize,
    }

    impl Seq2SeqModel for EagerEosModel {
        type Encoded = ();

        fn tokenize(&self, _text: &str) -> Result<Vec<u32>, ModelError> {
            Ok(vec![3])
        }

        fn encode(&mut self, _input_ids: &[u32]) -> Result<(), ModelError> {
            Ok(())
        }

        fn next_token_logits(
            &mut self,
            _encoded: &(),
            prefixes: &[Vec<u32>],
        ) -> Result<Vec<Vec<f32>>, ModelError> {
            self.calls += 1;
            Ok(prefixes
                .iter()
                .map(|_| vec![-10.0, -10.0, 5.0, 1.0, 0.5, 0.25, 0.1, 0.0])
                .collect())
        }

        fn decode(&self, _ids: &[u32]) -> Result<String, ModelError> {
            Ok(String::new())
        }

        fn special_tokens(&self) -> SpecialTokens {
            SpecialTokens {
                decoder_start: 2,
                eos: 2,
                forced_bos: None,
                forced_eos: None,
            }
        }

        fn device(&self) -> Device {
            Device::Cpu
        }
    }

    #[test]
    fn output_never_exceeds_max_length() {
        for max_length in [2, 3, 5, 9, 17] {
            let mut model = ScriptedModel::new();
            let encoded = source();
            let output = beam_search(&mut model, &encoded, &params(1, max_length)).expect("beam");
            assert!(output.len() <= max_length, "{output:?} longer than {max_length}");
            assert_eq!(output[0], 2);
        }
    }

    #[test]
    fn beam_width_does_not_size_allocations() {
        let mut model = ScriptedModel::new();
        let encoded = source();
        let wide = BeamParams {
            num_beams: 1_000_000_000_000,
            ..params(1, 4)
        };

        let output = beam_search(&mut model, &encoded, &wide).expect("beam");

        assert!(output.len() <= 4);
    }

    #[test]
    fn min_length_suppresses_early_end_of_sequence() {
        let mut model = EagerEosModel { calls: 0 };
        let output = beam_search(&mut model, &(), &params(5, 20)).expect("beam");

        assert!(output.len() >= 6, "{output:?}");
        assert!(output[1..output.len() - 1].iter().all(|token| *token != 2));
        assert_eq!(output.last(), Some(&2));
    }

    #[test]
    fn early_stopping_ends_once_beam_is_full() {
        let mut model = EagerEosModel { calls: 0 };
        let output = beam_search(&mut model, &(), &params(1, 50)).expect("beam");

        assert!(model.calls < 10, "decoder ran {} times", model.calls);
        assert!(output.len() < 10);
    }

    #[test]
    fn forced_bos_is_first_generated_token() {
        let mut model = ScriptedModel::new();
        model.forced_bos = true;
        let encoded = source();
        let output = beam_search(&mut model, &encoded, &params(3, 12)).expect("beam");

        assert_eq!(output[1], 0);
    }

    #[test]
    fn search_is_deterministic() {
        let encoded = source();
        let first = beam_search(&mut ScriptedModel::new(), &encoded, &params(3, 16)).expect("beam");
        let second =
            beam_search(&mut ScriptedModel::new(), &encoded, &params(3, 16)).expect("beam");
        assert_eq!(first, second);
    }

    #[test]
    fn log_softmax_normalizes() {
        let log_probs = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = log_probs.iter().map(|value| value.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(log_probs[2] > log_probs[1]);
    }

    #[test]
    fn top_k_orders_by_score_then_token() {
        let mut row = vec![0.0_f32; VOCAB];
        row[5] = 2.0;
        row[1] = 2.0;
        row[0] = f32::NEG_INFINITY;
        let top = top_k(&row, 3);
        assert_eq!(top.iter().map(|(token, _)| *token).collect::<Vec<_>>(), vec![1, 5, 2]);
    }

    #[test]
    fn mismatched_logit_rows_are_rejected() {
        struct Broken;
        impl Seq2SeqModel for Broken {
            type Encoded = ();
            fn tokenize(&self, _text: &str) -> Result<Vec<u32>, ModelError> {
                Ok(Vec::new())
            }
            fn encode(&mut self, _input_ids: &[u32]) -> Result<(), ModelError> {
                Ok(())
            }
            fn next_token_logits(
                &mut self,
                _encoded: &(),
                _prefixes: &[Vec<u32>],
            ) -> Result<Vec<Vec<f32>>, ModelError> {
                Ok(Vec::new())
            }
            fn decode(&self, _ids: &[u32]) -> Result<String, ModelError> {
                Ok(String::new())
            }
            fn special_tokens(&self) -> SpecialTokens {
                SpecialTokens {
                    decoder_start: 0,
                    eos: 0,
                    forced_bos: None,
                    forced_eos: None,
                }
            }
            fn device(&self) -> Device {
                Device::Cpu
            }
        }

        let result = beam_search(&mut Broken, &(), &params(1, 5));
        assert!(matches!(result, Err(ModelError::Inference(_))));
    }
}
