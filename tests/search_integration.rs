//! Search behavior on small hand-built networks
//!
//! The networks here are small enough to enumerate every path, so results
//! of the pruned search can be checked against an exhaustive one.

use std::collections::HashSet;
use std::time::Duration;
use tokpass::config::{NbestConfig, SearchConfig};
use tokpass::history::HistoryRef;
use tokpass::lm::LanguageModel;
use tokpass::network::{flags, Arc, Node, SearchNetwork, UnitId};
use tokpass::scorer::{AcousticScorer, FrameMatrix, NodeLookahead};
use tokpass::search::FrameStats;
use tokpass::{DecodeError, Decoder, Recognition, Vocabulary};

/// Context is the last unit, so tokens after different units never merge
struct LastUnitLm;

impl LanguageModel for LastUnitLm {
    type State = UnitId;

    fn sentence_start(&self) -> UnitId {
        0
    }

    fn score(&self, previous: UnitId, unit: UnitId) -> Option<(UnitId, f32)> {
        let repeat = if previous == unit { 0.5 } else { 0.0 };
        Some((unit, -0.3 - 0.2 * unit as f32 - repeat))
    }
}

/// Context-free model: every token at a node shares one state
struct UnigramLm;

impl LanguageModel for UnigramLm {
    type State = ();

    fn sentence_start(&self) {}

    fn score(&self, _state: (), unit: UnitId) -> Option<((), f32)> {
        match unit {
            1 => Some(((), -0.5)),
            2 => Some(((), -1.0)),
            3 => Some(((), -2.0)),
            _ => None,
        }
    }
}

fn vocab() -> Vocabulary {
    Vocabulary::new(["<s>", "</s>", "a", "b"], None).unwrap()
}

/// Two competing states, each ending in its own unit, joined by a third
/// state that loops back to both
fn looping_network() -> SearchNetwork {
    SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0).arc(2, 0.0),
        Node::emitting(0).arc(1, -0.4).arc(3, -0.9),
        Node::emitting(1).arc(2, -0.6).arc(5, -0.2),
        Node::unit(2).arc(4, 0.0),
        Node::emitting(2).arc(4, -0.1).arc(1, -1.0).arc(2, -1.2),
        Node::unit(3).arc(4, 0.0),
    ])
    .unwrap()
}

fn frames() -> Vec<Vec<f32>> {
    vec![
        vec![-1.0, -1.3, -4.0],
        vec![-1.2, -0.9, -3.0],
        vec![-3.0, -2.5, -0.4],
        vec![-0.8, -1.1, -2.0],
        vec![-2.2, -0.7, -0.6],
        vec![-1.9, -2.4, -0.3],
    ]
}

fn long_frames(count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|f| {
            (0..3)
                .map(|s| -0.5 - 0.4 * ((f * 7 + s * 3) % 5) as f32)
                .collect()
        })
        .collect()
}

/// No pruning at all: beams and the token limit can never trigger
fn exhaustive() -> SearchConfig {
    SearchConfig {
        lm_scale: 2.0,
        global_beam: 1e9,
        node_beam: 1e9,
        word_end_beam: 1e9,
        token_limit: 1_000_000,
        max_state_duration: 1000,
        force_sentence_end: false,
        ..SearchConfig::default()
    }
}

// ============================================================================
// Exhaustive reference search
// ============================================================================

#[derive(Clone, Debug)]
struct Path {
    node: u32,
    am: f32,
    lm: f32,
    lm_state: UnitId,
    units: Vec<UnitId>,
}

fn walk<L: LanguageModel<State = UnitId>>(
    net: &SearchNetwork,
    lm: &L,
    mut path: Path,
    arc: &Arc,
    scores: &[f32],
    out: &mut Vec<Path>,
) {
    path.am += arc.log_prob;
    let self_loop = arc.target == path.node;
    path.node = arc.target;
    let node = net.node(arc.target);
    if !self_loop {
        if let Some(unit) = node.unit {
            let (state, lp) = lm.score(path.lm_state, unit).unwrap();
            path.lm += lp;
            path.lm_state = state;
            path.units.push(unit);
        }
    }
    if let Some(state) = node.state {
        path.am += scores[state as usize];
        out.push(path);
        return;
    }
    for next in &node.arcs {
        walk(net, lm, path.clone(), next, scores, out);
    }
}

/// Every path through the network that emits exactly one state per frame
fn all_paths<L: LanguageModel<State = UnitId>>(
    net: &SearchNetwork,
    lm: &L,
    frames: &[Vec<f32>],
) -> Vec<Path> {
    let mut paths = vec![Path {
        node: net.decode_start(),
        am: 0.0,
        lm: 0.0,
        lm_state: lm.sentence_start(),
        units: Vec::new(),
    }];
    for scores in frames {
        let mut next = Vec::new();
        for path in &paths {
            for arc in &net.node(path.node).arcs {
                walk(net, lm, path.clone(), arc, scores, &mut next);
            }
        }
        paths = next;
    }
    paths
}

fn total(path: &Path, lm_scale: f32) -> f32 {
    path.am + lm_scale * path.lm
}

// ============================================================================
// Optimality
// ============================================================================

#[test]
fn exhaustive_search_finds_best_path() {
    let decoder = Decoder::new(looping_network(), vocab(), LastUnitLm, exhaustive()).unwrap();
    let mut acoustics = FrameMatrix::from_rows(frames()).unwrap();
    let result = decoder.recognize(&mut acoustics).unwrap();

    let paths = all_paths(decoder.network(), &LastUnitLm, &frames());
    let best = paths
        .iter()
        .max_by(|a, b| total(a, 2.0).total_cmp(&total(b, 2.0)))
        .unwrap();
    let best_total = total(best, 2.0);

    assert!(
        (result.best.total_log_prob - best_total).abs() < 1e-3,
        "decoder {} vs exhaustive {}",
        result.best.total_log_prob,
        best_total
    );
    assert!((result.best.am_log_prob - best.am).abs() < 1e-3);
    assert!((result.best.lm_log_prob - best.lm).abs() < 1e-3);

    // Unit sequence only compared when the optimum is unambiguous
    let near: HashSet<Vec<UnitId>> = paths
        .iter()
        .filter(|p| total(p, 2.0) > best_total - 1e-3)
        .map(|p| p.units.clone())
        .collect();
    if near.len() == 1 {
        assert_eq!(result.best.unit_ids, best.units);
    }
    assert_eq!(result.frames, frames().len());
    assert!(!result.alignment.is_empty());
}

#[test]
fn pruned_search_never_beats_exhaustive_search() {
    let frames = long_frames(12);
    let full = Decoder::new(looping_network(), vocab(), LastUnitLm, exhaustive())
        .unwrap()
        .recognize(&mut FrameMatrix::from_rows(frames.clone()).unwrap())
        .unwrap();

    for beam in [0.5, 1.0, 3.0, 10.0] {
        let config = SearchConfig {
            global_beam: beam,
            node_beam: beam,
            word_end_beam: beam,
            ..exhaustive()
        };
        let pruned = Decoder::new(looping_network(), vocab(), LastUnitLm, config)
            .unwrap()
            .recognize(&mut FrameMatrix::from_rows(frames.clone()).unwrap())
            .unwrap();
        assert!(pruned.best.total_log_prob <= full.best.total_log_prob + 1e-3);
    }

    for token_limit in [1, 2, 4] {
        let config = SearchConfig {
            token_limit,
            ..exhaustive()
        };
        let pruned = Decoder::new(looping_network(), vocab(), LastUnitLm, config)
            .unwrap()
            .recognize(&mut FrameMatrix::from_rows(frames.clone()).unwrap())
            .unwrap();
        assert!(pruned.best.total_log_prob <= full.best.total_log_prob + 1e-3);
        assert!(pruned.total_token_count <= full.total_token_count);
    }
}

#[test]
fn lookahead_does_not_change_exhaustive_result() {
    let mut nodes = looping_network().nodes().to_vec();
    // Refresh the estimate when entering the joining state
    for idx in [3, 5] {
        for arc in nodes[idx].arcs.iter_mut() {
            arc.update_lookahead = true;
        }
    }
    let network = SearchNetwork::new(nodes).unwrap();

    let mut lookahead = NodeLookahead::new();
    lookahead.set(4, -3.0);
    lookahead.set_in_context(4, 2, -1.0);

    let plain = Decoder::new(looping_network(), vocab(), LastUnitLm, exhaustive())
        .unwrap()
        .recognize(&mut FrameMatrix::from_rows(frames()).unwrap())
        .unwrap();
    let with_lookahead = Decoder::new(network, vocab(), LastUnitLm, exhaustive())
        .unwrap()
        .with_lookahead(Box::new(lookahead))
        .recognize(&mut FrameMatrix::from_rows(frames()).unwrap())
        .unwrap();

    assert!((plain.best.total_log_prob - with_lookahead.best.total_log_prob).abs() < 1e-3);
    assert!((plain.best.lm_log_prob - with_lookahead.best.lm_log_prob).abs() < 1e-3);
    assert_eq!(plain.best.unit_ids, with_lookahead.best.unit_ids);
}

// ============================================================================
// Beams and histogram
// ============================================================================

/// Steps one frame per row and returns the frame stats after each step
fn stats_per_frame<L: LanguageModel>(
    decoder: &Decoder<L>,
    frames: Vec<Vec<f32>>,
) -> Vec<(FrameStats, usize)> {
    let mut acoustics = FrameMatrix::from_rows(frames).unwrap();
    let mut recognition = decoder.recognition();
    let mut per_frame = Vec::new();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();
        per_frame.push((*recognition.stats(), recognition.token_count()));
    }
    per_frame
}

#[test]
fn word_end_beam_ignores_lookahead() {
    // Three word ends in one frame: "a" plain, "a" behind a -50 lookahead
    // estimate, and "b" with a poor acoustic score
    let network = SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0).arc(2, 0.0).arc(3, 0.0),
        Node::unit(2).arc(4, 0.0),
        Node::unit(2).lookahead_arc(5, 0.0),
        Node::unit(3).arc(6, 0.0),
        Node::emitting(0),
        Node::emitting(1),
        Node::emitting(2),
    ])
    .unwrap();
    let mut lookahead = NodeLookahead::new();
    lookahead.set(5, -50.0);
    let config = SearchConfig {
        lm_scale: 1.0,
        word_end_beam: 10.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(network, vocab(), UnigramLm, config)
        .unwrap()
        .with_lookahead(Box::new(lookahead));

    let mut acoustics = FrameMatrix::from_rows(vec![vec![-1.0, -1.0, -20.0]]).unwrap();
    let mut recognition = decoder.recognition();
    assert!(acoustics.go_to(0));
    recognition.step(&acoustics).unwrap();

    // Floor is -2 - 10. With lookahead the estimated token scores -52 but
    // -2 without it; "b" scores -22.
    assert_eq!(recognition.stats().word_end_beam_pruned, 1);
    let mut nodes: Vec<u32> = recognition.tokens().map(|t| t.node).collect();
    nodes.sort_unstable();
    assert_eq!(nodes, vec![4, 5]);
    let estimated = recognition.tokens().find(|t| t.node == 5).unwrap();
    assert!((estimated.total_log_prob + 52.0).abs() < 1e-4);
}

#[test]
fn node_beam_prunes_within_a_node() {
    // Two contexts reach the same state; with lm_scale 10 they are 2 apart
    let network = SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0).arc(2, 0.0),
        Node::unit(2).arc(3, 0.0),
        Node::unit(3).arc(3, 0.0),
        Node::emitting(0),
    ])
    .unwrap();
    let narrow = SearchConfig {
        lm_scale: 10.0,
        node_beam: 1.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(network.clone(), vocab(), LastUnitLm, narrow).unwrap();
    let (stats, tokens) = stats_per_frame(&decoder, vec![vec![-1.0]])[0];
    assert_eq!(stats.node_beam_pruned, 1);
    assert_eq!(stats.global_beam_pruned, 0);
    assert_eq!(tokens, 1);

    let wide = SearchConfig {
        lm_scale: 10.0,
        node_beam: 3.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(network, vocab(), LastUnitLm, wide).unwrap();
    let (stats, tokens) = stats_per_frame(&decoder, vec![vec![-1.0]])[0];
    assert_eq!(stats.node_beam_pruned, 0);
    assert_eq!(tokens, 2);
}

/// Three parallel self-looping states scoring 0, -3 and -6 per frame
fn parallel_network() -> SearchNetwork {
    SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0).arc(2, 0.0).arc(3, 0.0),
        Node::emitting(0).arc(1, 0.0),
        Node::emitting(1).arc(2, 0.0),
        Node::emitting(2).arc(3, 0.0),
    ])
    .unwrap()
}

#[test]
fn histogram_limit_applies_one_frame_later() {
    let frames = vec![vec![0.0, -3.0, -6.0]; 3];
    let limited = SearchConfig {
        global_beam: 20.0,
        token_limit: 1,
        ..exhaustive()
    };
    let decoder = Decoder::new(parallel_network(), vocab(), LastUnitLm, limited).unwrap();
    let per_frame = stats_per_frame(&decoder, frames.clone());

    // Frame 0 bins the tokens at 99, 84 and 69; the limit lands on 84
    let (first, tokens) = per_frame[0];
    assert_eq!(first.histogram_pruned, 0);
    assert_eq!(tokens, 3);
    assert_eq!(first.histogram_bin_limit, 84);

    // Frame 1 skips the token left in bin 69 although the global beam
    // would have kept it
    let (second, tokens) = per_frame[1];
    assert_eq!(second.histogram_pruned, 1);
    assert_eq!(second.global_beam_pruned, 0);
    assert_eq!(tokens, 2);

    let unlimited = SearchConfig {
        global_beam: 20.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(parallel_network(), vocab(), LastUnitLm, unlimited).unwrap();
    for (stats, tokens) in stats_per_frame(&decoder, frames) {
        assert_eq!(stats.histogram_pruned, 0);
        assert_eq!(tokens, 3);
    }
}

// ============================================================================
// Maximum state duration
// ============================================================================

fn single_state_network() -> SearchNetwork {
    SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0),
        Node::emitting(0).arc(1, -0.1),
    ])
    .unwrap()
}

#[test]
fn long_dwell_is_dropped() {
    let config = SearchConfig {
        max_state_duration: 2,
        ..exhaustive()
    };
    let decoder = Decoder::new(single_state_network(), vocab(), LastUnitLm, config).unwrap();
    let mut acoustics = FrameMatrix::from_rows(vec![vec![-1.0]; 5]).unwrap();

    let mut recognition = decoder.recognition();
    assert!(acoustics.go_to(0));
    recognition.step(&acoustics).unwrap();
    assert!(acoustics.go_to(1));
    recognition.step(&acoustics).unwrap();
    assert!(acoustics.go_to(2));
    let err = recognition.step(&acoustics).unwrap_err();
    assert_eq!(err, DecodeError::NoSurvivingHypothesis { frame: 2 });
    assert_eq!(recognition.stats().max_duration_pruned, 1);

    let mut acoustics = FrameMatrix::from_rows(vec![vec![-1.0]; 5]).unwrap();
    assert_eq!(
        decoder.recognize(&mut acoustics).unwrap_err(),
        DecodeError::NoSurvivingHypothesis { frame: 2 }
    );
}

#[test]
fn silence_states_may_dwell() {
    let config = SearchConfig {
        max_state_duration: 2,
        ..exhaustive()
    };
    let network = single_state_network().with_last_silence_state(Some(0));
    let decoder = Decoder::new(network, vocab(), LastUnitLm, config).unwrap();
    let mut acoustics = FrameMatrix::from_rows(vec![vec![-1.0]; 5]).unwrap();

    let result = decoder.recognize(&mut acoustics).unwrap();
    assert_eq!(result.frames, 5);
    assert_eq!(result.alignment.len(), 1);
    assert_eq!(result.alignment[0].start_frame, 0);
    assert_eq!(result.alignment[0].end_frame, 5);
}

#[test]
fn empty_utterance() {
    let decoder = Decoder::new(single_state_network(), vocab(), LastUnitLm, exhaustive()).unwrap();
    let mut acoustics = FrameMatrix::from_rows(Vec::new()).unwrap();
    assert_eq!(
        decoder.recognize(&mut acoustics).unwrap_err(),
        DecodeError::EmptyUtterance
    );
}

// ============================================================================
// Recombination and alternates
// ============================================================================

/// Two single-frame branches ending in different units, merging into one
/// state. With a context-free model both arrive with the same key.
fn merging_network() -> SearchNetwork {
    SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0).arc(2, 0.0),
        Node::emitting(0).arc(3, 0.0),
        Node::emitting(1).arc(4, 0.0),
        Node::unit(2).arc(5, 0.0),
        Node::unit(3).arc(5, 0.0),
        Node::emitting(2).arc(5, 0.0),
    ])
    .unwrap()
}

fn merging_frames() -> Vec<Vec<f32>> {
    vec![vec![-1.0, -0.5, -9.0], vec![-9.0, -9.0, -1.0]]
}

#[test]
fn recombination_keeps_best_and_links_loser() {
    let config = SearchConfig {
        lm_scale: 1.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(merging_network(), vocab(), UnigramLm, config)
        .unwrap()
        .with_nbest(NbestConfig {
            enabled: true,
            ..NbestConfig::default()
        });
    let mut acoustics = FrameMatrix::from_rows(merging_frames()).unwrap();

    let mut recognition = decoder.recognition();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();
    }
    assert_eq!(recognition.token_count(), 1);
    assert_eq!(recognition.stats().recombined, 1);
    assert_eq!(recognition.links_recorded(), 1);

    let result = recognition.finish(Duration::ZERO).unwrap();
    // a: -1.0 - 1.0 - 1.0, b: -0.5 - 1.0 - 2.0
    assert_eq!(result.best.units, vec!["a"]);
    assert!((result.best.total_log_prob + 3.0).abs() < 1e-5);

    assert_eq!(result.alternates.len(), 2);
    assert_eq!(result.alternates[0].units, vec!["a"]);
    assert_eq!(result.alternates[1].units, vec!["b"]);
    assert!((result.alternates[1].total_log_prob + 3.5).abs() < 1e-5);
    assert!((result.alternates[1].am_log_prob + 1.5).abs() < 1e-5);
    assert!((result.alternates[1].lm_log_prob + 2.0).abs() < 1e-5);
}

#[test]
fn no_links_without_nbest() {
    let config = SearchConfig {
        lm_scale: 1.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(merging_network(), vocab(), UnigramLm, config).unwrap();
    let mut acoustics = FrameMatrix::from_rows(merging_frames()).unwrap();

    let mut recognition = decoder.recognition();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();
    }
    assert_eq!(recognition.links_recorded(), 0);
    let result = recognition.finish(Duration::ZERO).unwrap();
    assert!(result.alternates.is_empty());
}

#[test]
fn alignment_follows_winning_path() {
    let config = SearchConfig {
        lm_scale: 1.0,
        ..exhaustive()
    };
    let decoder = Decoder::new(merging_network(), vocab(), UnigramLm, config).unwrap();
    let result = decoder
        .recognize(&mut FrameMatrix::from_rows(merging_frames()).unwrap())
        .unwrap();

    let spans: Vec<(u32, u32, u32)> = result
        .alignment
        .iter()
        .map(|s| (s.state, s.start_frame, s.end_frame))
        .collect();
    assert_eq!(spans, vec![(0, 0, 1), (2, 1, 2)]);
}

// ============================================================================
// History maintenance
// ============================================================================

#[test]
fn garbage_collection_keeps_exactly_live_paths() {
    let config = SearchConfig {
        global_beam: 4.0,
        node_beam: 4.0,
        word_end_beam: 4.0,
        history_clean_frame_interval: 1,
        ..exhaustive()
    };
    let decoder = Decoder::new(looping_network(), vocab(), LastUnitLm, config).unwrap();
    let mut acoustics = FrameMatrix::from_rows(long_frames(30)).unwrap();

    let mut recognition = decoder.recognition();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();

        let words = recognition.word_history();
        let states = recognition.state_history();
        let mut word_nodes = HashSet::new();
        let mut state_nodes = HashSet::new();
        for token in recognition.tokens() {
            for node in words.path_to_root(token.word_history) {
                assert!(words.contains(node));
                word_nodes.insert(node);
            }
            for node in states.path_to_root(token.state_history) {
                assert!(states.contains(node));
                state_nodes.insert(node);
            }
        }
        assert_eq!(words.len(), word_nodes.len());
        assert_eq!(states.len(), state_nodes.len());
    }
}

#[test]
fn reconstruction_is_repeatable() {
    let decoder = Decoder::new(looping_network(), vocab(), LastUnitLm, exhaustive()).unwrap();
    let mut acoustics = FrameMatrix::from_rows(long_frames(8)).unwrap();

    let mut recognition = decoder.recognition();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();
    }
    let history = recognition.best_history().unwrap();
    let first = recognition.units(history);
    assert_eq!(first, recognition.units(history));
    assert_eq!(first[0], 0);

    for token in recognition.tokens() {
        assert_eq!(
            recognition.units(token.word_history),
            recognition.units(token.word_history)
        );
    }
}

fn decode_eight_frames(
    recognition: &mut Recognition<'_, LastUnitLm>,
) -> (HistoryRef, Vec<UnitId>, usize) {
    let mut acoustics = FrameMatrix::from_rows(long_frames(8)).unwrap();
    while acoustics.go_to(recognition.frame()) {
        recognition.step(&acoustics).unwrap();
    }
    let history = recognition.best_history().unwrap();
    (history, recognition.units(history), recognition.token_count())
}

#[test]
fn reset_starts_a_fresh_utterance() {
    let decoder = Decoder::new(looping_network(), vocab(), LastUnitLm, exhaustive()).unwrap();
    let mut recognition = decoder.recognition();

    let (old_history, first_units, first_count) = decode_eight_frames(&mut recognition);
    recognition.reset();
    assert_eq!(recognition.frame(), 0);
    assert_eq!(recognition.token_count(), 1);
    assert_eq!(recognition.word_history().len(), 1);
    assert_eq!(recognition.state_history().len(), 1);
    assert!(!recognition.word_history().contains(old_history));

    let (_, second_units, second_count) = decode_eight_frames(&mut recognition);
    assert_eq!(first_units, second_units);
    assert_eq!(first_count, second_count);
}

// ============================================================================
// Finalization
// ============================================================================

fn one_word_network(end_flags: u16) -> SearchNetwork {
    SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0),
        Node::emitting(0).arc(2, 0.0),
        Node::unit(2).arc(3, 0.0),
        Node::emitting(1).arc(3, 0.0).with_flags(end_flags),
    ])
    .unwrap()
}

fn one_word_frames() -> Vec<Vec<f32>> {
    vec![vec![-1.0, -5.0], vec![-5.0, -1.0], vec![-5.0, -1.0]]
}

#[test]
fn sentence_end_is_forced() {
    let config = SearchConfig {
        lm_scale: 1.0,
        force_sentence_end: true,
        ..exhaustive()
    };
    let decoder = Decoder::new(one_word_network(0), vocab(), LastUnitLm, config.clone()).unwrap();
    let result = decoder
        .recognize(&mut FrameMatrix::from_rows(one_word_frames()).unwrap())
        .unwrap();
    // a after <s>: -0.7, </s> after a: -0.5
    assert_eq!(result.best.units, vec!["a"]);
    assert!((result.best.lm_log_prob + 1.2).abs() < 1e-5);

    let keep = SearchConfig {
        keep_sentence_markers: true,
        ..config
    };
    let decoder = Decoder::new(one_word_network(0), vocab(), LastUnitLm, keep).unwrap();
    let result = decoder
        .recognize(&mut FrameMatrix::from_rows(one_word_frames()).unwrap())
        .unwrap();
    assert_eq!(result.best.units, vec!["<s>", "a", "</s>"]);
}

#[test]
fn silence_end_is_not_forced() {
    let config = SearchConfig {
        lm_scale: 1.0,
        force_sentence_end: true,
        ..exhaustive()
    };
    let decoder =
        Decoder::new(one_word_network(flags::SILENCE), vocab(), LastUnitLm, config).unwrap();
    let result = decoder
        .recognize(&mut FrameMatrix::from_rows(one_word_frames()).unwrap())
        .unwrap();
    assert_eq!(result.best.units, vec!["a"]);
    assert!((result.best.lm_log_prob + 0.7).abs() < 1e-5);
    assert!((result.best.am_log_prob + 3.0).abs() < 1e-5);
}

#[test]
fn subwords_are_glued_into_words() {
    let vocab = Vocabulary::new(["<s>", "</s>", "<w>", "ab", "c"], Some("<w>")).unwrap();
    let network = SearchNetwork::new(vec![
        Node::routing().arc(1, 0.0),
        Node::emitting(0).arc(2, 0.0),
        Node::unit(3).arc(3, 0.0),
        Node::emitting(1).arc(4, 0.0),
        Node::unit(4).arc(5, 0.0),
        Node::emitting(2).arc(5, 0.0),
    ])
    .unwrap();
    let decoder = Decoder::new(network, vocab, LastUnitLm, exhaustive()).unwrap();
    assert_eq!(decoder.markers().word_boundary, Some(2));

    let frames = vec![vec![-1.0, -1.0, -1.0]; 3];
    let result = decoder
        .recognize(&mut FrameMatrix::from_rows(frames).unwrap())
        .unwrap();
    assert_eq!(result.best.units, vec!["<w>", "ab", "c"]);
    assert_eq!(result.best.text, "abc");
}

#[test]
fn unit_outside_vocabulary_is_rejected() {
    let network = SearchNetwork::new(vec![Node::routing().arc(1, 0.0), Node::unit(9)]).unwrap();
    assert!(Decoder::new(network, vocab(), LastUnitLm, exhaustive()).is_err());
}
