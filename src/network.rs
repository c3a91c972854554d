//! Search network: the compiled decoding graph
//!
//! A network is an ordered list of nodes. Each node may carry an emitting
//! HMM state, a vocabulary unit boundary, both or neither, and owns an
//! ordered list of weighted arcs. The decoder only reads the network.
//!
//! Text format, one record per line:
//!
//! ```text
//! <node_count> [last_silence_state]
//! n <idx> <state|-1> <unit|-1> <arc_count> <flags>
//! ...
//! a <src> <tgt> [log_prob] [update_lookahead]
//! ...
//! ```
//!
//! Node records come first, in index order. Arc records follow in the order
//! the arcs are tried during propagation.

use crate::error::ModelError;
use std::io::BufRead;
use std::path::Path;

/// Index of a node in the search network
pub type NodeIndex = u32;

/// Vocabulary unit identifier (line number in the vocabulary file)
pub type UnitId = u32;

/// Emitting HMM state identifier (column in the acoustic score matrix)
pub type StateId = u32;

/// Node flag bits written by the graph builder
pub mod flags {
    pub const FAN_OUT_DUMMY: u16 = 0x0001;
    pub const FAN_IN_DUMMY: u16 = 0x0002;
    pub const CROSS_WORD: u16 = 0x0004;
    /// Trailing silence; a token ending here finished the sentence naturally
    pub const SILENCE: u16 = 0x0008;
    pub const INITIAL: u16 = 0x0010;
    pub const BIGRAM_LOOKAHEAD_TABLE: u16 = 0x0020;
    /// Where the seed token is placed
    pub const DECODE_START: u16 = 0x0040;
    pub const LM_LEFT_LIMIT: u16 = 0x0080;
    pub const LM_RIGHT_LIMIT: u16 = 0x0100;
    pub const TAIL: u16 = 0x0200;
}

/// Weighted transition between two nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub target: NodeIndex,
    pub log_prob: f32,
    /// Crossing this arc recomputes the lookahead estimate
    pub update_lookahead: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub state: Option<StateId>,
    pub unit: Option<UnitId>,
    pub flags: u16,
    pub arcs: Vec<Arc>,
}

impl Node {
    /// Node emitting the given HMM state
    pub fn emitting(state: StateId) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Unit boundary node
    pub fn unit(unit: UnitId) -> Self {
        Self {
            unit: Some(unit),
            ..Self::default()
        }
    }

    /// Pure routing node
    pub fn routing() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    /// Append an arc that does not touch the lookahead estimate
    pub fn arc(mut self, target: NodeIndex, log_prob: f32) -> Self {
        self.arcs.push(Arc {
            target,
            log_prob,
            update_lookahead: false,
        });
        self
    }

    /// Append an arc that refreshes the lookahead estimate
    pub fn lookahead_arc(mut self, target: NodeIndex, log_prob: f32) -> Self {
        self.arcs.push(Arc {
            target,
            log_prob,
            update_lookahead: true,
        });
        self
    }

    pub fn is_emitting(&self) -> bool {
        self.state.is_some()
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

/// Validated, read-only decoding graph
#[derive(Debug, Clone)]
pub struct SearchNetwork {
    nodes: Vec<Node>,
    decode_start: NodeIndex,
    last_silence_state: Option<StateId>,
    /// One past the highest emitting state id
    state_count: usize,
}

impl SearchNetwork {
    /// Build a network from nodes, validating its structure.
    ///
    /// The decode start is the node flagged [`flags::DECODE_START`], or node 0
    /// if none is flagged.
    pub fn new(nodes: Vec<Node>) -> Result<Self, ModelError> {
        if nodes.is_empty() {
            return Err(ModelError::Network("network has no nodes".to_string()));
        }
        if nodes.len() > NodeIndex::MAX as usize {
            return Err(ModelError::Network(format!(
                "network has {} nodes, more than supported",
                nodes.len()
            )));
        }

        let mut decode_start = None;
        for (idx, node) in nodes.iter().enumerate() {
            for arc in &node.arcs {
                if arc.target as usize >= nodes.len() {
                    return Err(ModelError::Network(format!(
                        "arc {} -> {} points past the last node ({})",
                        idx,
                        arc.target,
                        nodes.len() - 1
                    )));
                }
            }
            if node.has_flag(flags::DECODE_START) {
                if let Some(prev) = decode_start {
                    return Err(ModelError::Network(format!(
                        "nodes {} and {} are both flagged as decode start",
                        prev, idx
                    )));
                }
                decode_start = Some(idx as NodeIndex);
            }
        }

        let state_count = nodes
            .iter()
            .filter_map(|n| n.state)
            .map(|s| s as usize + 1)
            .max()
            .unwrap_or(0);

        let network = Self {
            nodes,
            decode_start: decode_start.unwrap_or(0),
            last_silence_state: None,
            state_count,
        };
        network.check_non_emitting_cycles()?;
        Ok(network)
    }

    /// States with id up to and including `last` are silence states
    pub fn with_last_silence_state(mut self, last: Option<StateId>) -> Self {
        self.last_silence_state = last;
        self
    }

    /// Read a network in the text graph format
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        let network = Self::from_reader(std::io::BufReader::new(file), path)?;
        tracing::info!(
            "Loaded search network {:?}: {} nodes, {} arcs, decode start {}",
            path,
            network.len(),
            network.arc_count(),
            network.decode_start
        );
        Ok(network)
    }

    /// Parse the text graph format. `origin` is only used in error messages.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self, ModelError> {
        let mut lines = reader
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(true));

        let (line_no, header) = match lines.next() {
            Some((n, line)) => (n, line.map_err(|e| ModelError::read(origin, e))?),
            None => return Err(ModelError::parse(origin, 1, "empty graph file")),
        };
        let mut fields = header.split_whitespace();
        let node_count: usize = parse_field(fields.next(), origin, line_no, "node count")?;
        let last_silence_state = match fields.next() {
            Some(v) => {
                let value: i64 = parse_field(Some(v), origin, line_no, "last silence state")?;
                u32::try_from(value).ok()
            }
            None => None,
        };

        let mut nodes = Vec::with_capacity(node_count);
        let mut declared_arcs = Vec::with_capacity(node_count);
        while nodes.len() < node_count {
            let (line_no, line) = match lines.next() {
                Some((n, line)) => (n, line.map_err(|e| ModelError::read(origin, e))?),
                None => {
                    return Err(ModelError::parse(
                        origin,
                        0,
                        format!("expected {} node records, found {}", node_count, nodes.len()),
                    ))
                }
            };
            let mut f = line.split_whitespace();
            if f.next() != Some("n") {
                return Err(ModelError::parse(origin, line_no, "expected node record 'n'"));
            }
            let idx: usize = parse_field(f.next(), origin, line_no, "node index")?;
            if idx != nodes.len() {
                return Err(ModelError::parse(
                    origin,
                    line_no,
                    format!("node {} out of order, expected {}", idx, nodes.len()),
                ));
            }
            let state: i64 = parse_field(f.next(), origin, line_no, "state")?;
            let unit: i64 = parse_field(f.next(), origin, line_no, "unit")?;
            let arc_count: usize = parse_field(f.next(), origin, line_no, "arc count")?;
            let node_flags: u16 = parse_field(f.next(), origin, line_no, "flags")?;
            nodes.push(Node {
                state: optional_id(state, origin, line_no, "state")?,
                unit: optional_id(unit, origin, line_no, "unit")?,
                flags: node_flags,
                arcs: Vec::with_capacity(arc_count),
            });
            declared_arcs.push(arc_count);
        }

        for (line_no, line) in lines {
            let line = line.map_err(|e| ModelError::read(origin, e))?;
            let mut f = line.split_whitespace();
            if f.next() != Some("a") {
                return Err(ModelError::parse(origin, line_no, "expected arc record 'a'"));
            }
            let src: usize = parse_field(f.next(), origin, line_no, "arc source")?;
            let target: NodeIndex = parse_field(f.next(), origin, line_no, "arc target")?;
            let log_prob: f32 = match f.next() {
                Some(v) => parse_field(Some(v), origin, line_no, "arc log-probability")?,
                None => 0.0,
            };
            let update_lookahead = match f.next() {
                Some(v) => parse_field::<u8>(Some(v), origin, line_no, "lookahead flag")? != 0,
                None => false,
            };
            let node = nodes.get_mut(src).ok_or_else(|| {
                ModelError::parse(origin, line_no, format!("arc source {} is not a node", src))
            })?;
            node.arcs.push(Arc {
                target,
                log_prob,
                update_lookahead,
            });
        }

        for (idx, (node, declared)) in nodes.iter().zip(&declared_arcs).enumerate() {
            if node.arcs.len() != *declared {
                return Err(ModelError::Network(format!(
                    "node {} declares {} arcs but has {}",
                    idx,
                    declared,
                    node.arcs.len()
                )));
            }
        }

        Ok(Self::new(nodes)?.with_last_silence_state(last_silence_state))
    }

    /// Set arc weights of every emitting node from its state's transition
    /// model. `transitions(state)` returns `(self_loop, advance)` log-probs.
    pub fn set_transition_probs<F>(&mut self, transitions: F)
    where
        F: Fn(StateId) -> (f32, f32),
    {
        for (idx, node) in self.nodes.iter_mut().enumerate() {
            let Some(state) = node.state else { continue };
            let (self_loop, advance) = transitions(state);
            for arc in &mut node.arcs {
                arc.log_prob = if arc.target as usize == idx {
                    self_loop
                } else {
                    advance
                };
            }
        }
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn arc_count(&self) -> usize {
        self.nodes.iter().map(|n| n.arcs.len()).sum()
    }

    /// Acoustic scores per frame needed to cover every emitting state
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn decode_start(&self) -> NodeIndex {
        self.decode_start
    }

    pub fn last_silence_state(&self) -> Option<StateId> {
        self.last_silence_state
    }

    /// Silence states are exempt from maximum duration pruning
    pub fn is_silence_state(&self, state: StateId) -> bool {
        self.last_silence_state.is_some_and(|last| state <= last)
    }

    /// Propagation walks non-emitting nodes within one frame, so a loop made
    /// only of them would never terminate.
    fn check_non_emitting_cycles(&self) -> Result<(), ModelError> {
        const UNVISITED: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        let mut color = vec![UNVISITED; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.nodes.len() {
            if self.nodes[start].is_emitting() || color[start] != UNVISITED {
                continue;
            }
            color[start] = ON_STACK;
            stack.push((start, 0));

            while let Some(top) = stack.last_mut() {
                let (node, next_arc) = *top;
                let arcs = &self.nodes[node].arcs;
                if next_arc >= arcs.len() {
                    color[node] = DONE;
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let target = arcs[next_arc].target as usize;
                if self.nodes[target].is_emitting() {
                    continue;
                }
                match color[target] {
                    UNVISITED => {
                        color[target] = ON_STACK;
                        stack.push((target, 0));
                    }
                    ON_STACK => {
                        return Err(ModelError::Network(format!(
                            "cycle through non-emitting nodes {} -> {}",
                            node, target
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    origin: &Path,
    line: usize,
    what: &str,
) -> Result<T, ModelError> {
    let field = field.ok_or_else(|| ModelError::parse(origin, line, format!("missing {}", what)))?;
    field
        .parse()
        .map_err(|_| ModelError::parse(origin, line, format!("invalid {} '{}'", what, field)))
}

fn optional_id(value: i64, origin: &Path, line: usize, what: &str) -> Result<Option<u32>, ModelError> {
    match value {
        -1 => Ok(None),
        v => u32::try_from(v)
            .map(Some)
            .map_err(|_| ModelError::parse(origin, line, format!("invalid {} {}", what, v))),
    }
}
