//! Thompson NFA construction with bounded repetition.
//!
//! Based on Russ Cox's article <https://swtch.com/~rsc/regexp/regexp1.html>
//! (Thompson NFA construction), extended with structural support for
//! bounded repetitions (`{min,max}`): a repetition is decomposed into a
//! **mandatory phase** of exactly `min` chained copies of the body and an
//! **optional phase** covering the remaining occurrences.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! regex_syntax::hir::Hir  ──from_hir──>  Expr  ──NfaBuilder──>  Nfa  ──to_dot──>  DOT
//! ```
//!
//! The builder performs a single top-down recursive pass over the
//! expression tree.  Each node is built from a caller-supplied *entry*
//! state and returns its freshly allocated *exit* state; fragments compose
//! by chaining these boundaries, so no back-patching of dangling pointers
//! is needed.  A state allocator is threaded `&mut` through every call —
//! never a shared counter — which keeps state numbering strictly
//! increasing and the whole construction reproducible.
//!
//! ## Bounded repetitions
//!
//! `body{min,max}` with a finite `max` is lowered to:
//!
//! ```text
//! body₁ ── … ── bodyₘᵢₙ ──ε──────────────────┐
//!                  │                          v
//!                  ├── bodyₘᵢₙ₊₁ ──ε──>  join state
//!                  │        │                 ^
//!                  │        └── … ──ε─────────┘
//! ```
//!
//! The mandatory chain enforces "at least `min`"; each optional occurrence
//! ramps into a single shared join state, so stopping after `0..=max-min`
//! extra repeats is always possible.  Unbounded repetitions (`max` absent)
//! instead build one extra instance of the body and connect its own entry
//! and exit with an epsilon in each direction, making that instance
//! skippable and arbitrarily repeatable without ever skipping a mandatory
//! occurrence.
//!
//! The produced [`Nfa`] is an immutable value: explicit state, transition
//! and epsilon-transition lists plus a start state and a set of final
//! states.  Epsilon closure is *not* precomputed; downstream consumers
//! must treat the epsilon relation as a directed graph and close over it
//! at use time.

use std::fmt;
use std::io::Write;

use indexmap::IndexSet;
use regex_syntax::hir::{self, HirKind};

/// Re-export so users do not need a direct `regex-syntax` dependency.
pub use regex_syntax::hir::Hir;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error returned for expressions the builder refuses to compile.
///
/// Every condition is detected before any NFA state is allocated, so a
/// failed build never leaves a partially-constructed automaton behind.
#[derive(Debug)]
pub enum Error {
    /// A byte range whose lower bound exceeds its upper bound.
    InvalidRange { min: u8, max: u8 },
    /// A bounded repetition with both bounds present and `max < min`.
    InvalidRepetitionBound { min: u32, max: u32 },
    /// A bounded repetition with an absent minimum but a present maximum.
    /// The construction has no rule for this shape; it is rejected rather
    /// than silently defaulted.
    UnsupportedBoundCombination { max: u32 },
    /// A Unicode character class that cannot be lowered to single bytes
    /// (i.e. contains codepoints above U+00FF), or a class matching no
    /// byte at all.
    UnsupportedClass(hir::Class),
    /// A look-around assertion (e.g. `^`, `$`, `\b`); the automaton model
    /// has no zero-width assertion edges.
    UnsupportedLook(hir::Look),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange { min, max } => {
                write!(f, "invalid byte range: min 0x{:02X} > max 0x{:02X}", min, max)
            }
            Self::InvalidRepetitionBound { min, max } => {
                write!(f, "invalid repetition bound: max {} < min {}", max, min)
            }
            Self::UnsupportedBoundCombination { max } => {
                write!(
                    f,
                    "unsupported repetition bounds: absent min with max {}",
                    max
                )
            }
            Self::UnsupportedClass(class) => {
                write!(f, "unsupported character class: {:?}", class)
            }
            Self::UnsupportedLook(look) => {
                write!(f, "unsupported look-around assertion: {:?}", look)
            }
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// State identifiers
// ---------------------------------------------------------------------------

/// Identifier of an NFA state.
///
/// A state carries no data beyond its identity.  Within one build,
/// identifiers are allocated strictly increasing from 0, so they are
/// pairwise distinct — a guarantee of the allocator, not a property
/// enforced by the containers holding them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of fresh state identifiers for one construction pass.
///
/// The allocator is a plain value passed `&mut` into every recursive
/// construction call, rather than a counter shared between builds.
/// Sibling fragments built in any order therefore never collide, and the
/// numbering of a given expression is reproducible.
#[derive(Debug, Default)]
struct StateAllocator {
    next: u32,
}

impl StateAllocator {
    /// Hand out the next identifier: 0, 1, 2, …
    fn allocate(&mut self) -> StateId {
        let id = StateId(self.next);
        self.next += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// The input specifier of a consuming transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Input {
    /// Exactly one byte value.
    Byte(u8),
    /// Any byte in the inclusive range `min..=max`.  Construction
    /// guarantees `min <= max`.
    Range { min: u8, max: u8 },
    /// Any byte value (`.`).
    Any,
}

impl Input {
    /// Test whether this specifier accepts `byte`.
    pub fn matches(self, byte: u8) -> bool {
        match self {
            Input::Byte(b) => byte == b,
            Input::Range { min, max } => min <= byte && byte <= max,
            Input::Any => true,
        }
    }
}

/// Write a byte in its diagram-label form: printable ASCII as itself,
/// everything else (and the DOT-significant `"` and `\`) as hex.
fn write_label_byte(f: &mut fmt::Formatter<'_>, byte: u8) -> fmt::Result {
    if byte.is_ascii_graphic() && byte != b'"' && byte != b'\\' {
        write!(f, "{}", byte as char)
    } else {
        write!(f, "0x{:02X}", byte)
    }
}

/// The textual form used as the diagram edge label.
impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Byte(b) => write_label_byte(f, *b),
            Input::Range { min, max } => {
                write_label_byte(f, *min)?;
                f.write_str("-")?;
                write_label_byte(f, *max)
            }
            Input::Any => f.write_str("."),
        }
    }
}

/// A consuming transition: `src --input--> dst`.
///
/// Several transitions may share endpoints with different inputs;
/// nondeterminism is intentional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub src: StateId,
    pub input: Input,
    pub dst: StateId,
}

/// An epsilon transition: `src --ε--> dst`, traversable without input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Epsilon {
    pub src: StateId,
    pub dst: StateId,
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

/// A regular-expression syntax tree node, as consumed by [`NfaBuilder`].
///
/// The tree is produced either directly or by lowering a `regex-syntax`
/// HIR via [`Expr::from_hir`]; this crate performs no regex-text parsing
/// of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// A single literal byte.
    Byte(u8),
    /// Any byte in the inclusive range `min..=max`.
    Range { min: u8, max: u8 },
    /// Any byte.
    Wildcard,
    /// Left followed by right.
    Concat(Box<Expr>, Box<Expr>),
    /// Left or right.
    Alternate(Box<Expr>, Box<Expr>),
    /// `sub{min,max}`.  An absent `max` means unbounded; an absent `min`
    /// is only meaningful together with an absent `max` (pure unbounded
    /// repeat) and is treated as 0 there.
    Repeat {
        sub: Box<Expr>,
        min: Option<u32>,
        max: Option<u32>,
    },
}

impl Expr {
    /// `left` followed by `right`.
    pub fn concat(left: Expr, right: Expr) -> Expr {
        Expr::Concat(Box::new(left), Box::new(right))
    }

    /// `left | right`.
    pub fn alternate(left: Expr, right: Expr) -> Expr {
        Expr::Alternate(Box::new(left), Box::new(right))
    }

    /// `sub{min,max}`.
    pub fn repeat(sub: Expr, min: Option<u32>, max: Option<u32>) -> Expr {
        Expr::Repeat {
            sub: Box::new(sub),
            min,
            max,
        }
    }

    /// Lower a `regex-syntax` HIR into an expression tree.
    ///
    /// Returns `Ok(None)` when the pattern matches only the empty string
    /// (the tree has no node for a zero-width match).  Constructs the
    /// automaton model cannot express — look-arounds, character classes
    /// beyond single bytes — are rejected with an [`Error`].
    ///
    /// Match *priority* (greedy vs. lazy repetition) is a property of a
    /// matcher, not of the automaton shape, and is ignored here.
    pub fn from_hir(hir: &Hir) -> Result<Option<Expr>, Error> {
        lower(hir)
    }
}

/// Fold `rhs` into an optional left-leaning chain built by `combine`.
fn fold_expr(acc: Option<Expr>, rhs: Expr, combine: fn(Expr, Expr) -> Expr) -> Option<Expr> {
    Some(match acc {
        None => rhs,
        Some(lhs) => combine(lhs, rhs),
    })
}

/// Lower a non-empty byte-range list into a range expression, or an
/// alternation of ranges for multi-range classes.  A range covering every
/// byte value becomes a wildcard; a one-byte range becomes a literal.
fn class_expr(ranges: &[(u8, u8)]) -> Expr {
    let mut expr = None;
    for &(min, max) in ranges {
        let range = match (min, max) {
            (0x00, 0xFF) => Expr::Wildcard,
            (min, max) if min == max => Expr::Byte(min),
            (min, max) => Expr::Range { min, max },
        };
        expr = fold_expr(expr, range, Expr::alternate);
    }
    expr.expect("class lowering requires at least one range")
}

fn lower(hir: &Hir) -> Result<Option<Expr>, Error> {
    match hir.kind() {
        HirKind::Empty => Ok(None),
        HirKind::Literal(lit) => {
            let mut expr = None;
            for &b in lit.0.iter() {
                expr = fold_expr(expr, Expr::Byte(b), Expr::concat);
            }
            Ok(expr)
        }
        HirKind::Class(hir::Class::Bytes(class)) => {
            let ranges: Vec<(u8, u8)> = class
                .ranges()
                .iter()
                .map(|r| (r.start(), r.end()))
                .collect();
            if ranges.is_empty() {
                return Err(Error::UnsupportedClass(hir::Class::Bytes(class.clone())));
            }
            Ok(Some(class_expr(&ranges)))
        }
        HirKind::Class(hir::Class::Unicode(class)) => {
            // regex-syntax may produce Unicode classes for ASCII-only
            // patterns.  If all ranges fit in a single byte (0x00..=0xFF),
            // lower them like a byte class; otherwise reject.
            let all_single_byte = class
                .ranges()
                .iter()
                .all(|r| (r.start() as u32) <= 0xFF && (r.end() as u32) <= 0xFF);
            if !all_single_byte || class.ranges().is_empty() {
                return Err(Error::UnsupportedClass(hir::Class::Unicode(class.clone())));
            }
            let ranges: Vec<(u8, u8)> = class
                .ranges()
                .iter()
                .map(|r| (r.start() as u8, r.end() as u8))
                .collect();
            Ok(Some(class_expr(&ranges)))
        }
        HirKind::Look(look) => Err(Error::UnsupportedLook(*look)),
        HirKind::Capture(cap) => lower(&cap.sub),
        HirKind::Concat(children) => {
            // Empty children contribute nothing to a concatenation.
            let mut expr = None;
            for child in children {
                if let Some(rhs) = lower(child)? {
                    expr = fold_expr(expr, rhs, Expr::concat);
                }
            }
            Ok(expr)
        }
        HirKind::Alternation(children) => {
            // An empty branch (`a|`) makes the whole alternation optional:
            // fold the non-empty branches and wrap them in `{0,1}`.
            let mut expr = None;
            let mut any_empty = false;
            for child in children {
                match lower(child)? {
                    Some(rhs) => expr = fold_expr(expr, rhs, Expr::alternate),
                    None => any_empty = true,
                }
            }
            Ok(match expr {
                Some(e) if any_empty => Some(Expr::repeat(e, Some(0), Some(1))),
                other => other,
            })
        }
        HirKind::Repetition(rep) => match lower(&rep.sub)? {
            Some(sub) => Ok(Some(Expr::Repeat {
                sub: Box::new(sub),
                min: Some(rep.min),
                max: rep.max,
            })),
            // Repeating a zero-width match is still a zero-width match.
            None => Ok(None),
        },
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check an expression tree for shapes the construction refuses.
///
/// Runs before any state is allocated, so a rejected expression never
/// mutates the builder's accumulator.
fn validate(expr: &Expr) -> Result<(), Error> {
    match expr {
        Expr::Byte(_) | Expr::Wildcard => Ok(()),
        Expr::Range { min, max } => {
            if min > max {
                Err(Error::InvalidRange {
                    min: *min,
                    max: *max,
                })
            } else {
                Ok(())
            }
        }
        Expr::Concat(left, right) | Expr::Alternate(left, right) => {
            validate(left)?;
            validate(right)
        }
        Expr::Repeat { sub, min, max } => {
            match (min, max) {
                (None, Some(max)) => {
                    return Err(Error::UnsupportedBoundCombination { max: *max });
                }
                (Some(min), Some(max)) if max < min => {
                    return Err(Error::InvalidRepetitionBound {
                        min: *min,
                        max: *max,
                    });
                }
                _ => {}
            }
            validate(sub)
        }
    }
}

// ---------------------------------------------------------------------------
// NFA builder
// ---------------------------------------------------------------------------

/// Builds an [`Nfa`] from an expression tree.
///
/// The builder owns the accumulator (states, transitions and epsilon
/// transitions under construction) and may be reused across builds; each
/// [`build`](Self::build) starts from a cleared accumulator and a fresh
/// allocator.  Construction is single-threaded and strictly depth-first:
/// each node is built from a caller-supplied entry state and returns its
/// exit state.
#[derive(Debug, Default)]
pub struct NfaBuilder {
    states: Vec<StateId>,
    transitions: Vec<Transition>,
    epsilons: Vec<Epsilon>,
}

impl NfaBuilder {
    /// Compile an expression tree into an [`Nfa`].
    ///
    /// State 0 is the automaton's start state, allocated before the
    /// recursion begins; the root fragment's exit becomes the single
    /// final state.  Ill-formed expressions are rejected up front (see
    /// [`Error`]) — on error, no partially-built automaton is returned.
    pub fn build(&mut self, expr: &Expr) -> Result<Nfa, Error> {
        validate(expr)?;

        self.states.clear();
        self.transitions.clear();
        self.epsilons.clear();

        let mut alloc = StateAllocator::default();
        let start = self.state(&mut alloc);
        let exit = self.expr(expr, &mut alloc, start);

        let mut finals = IndexSet::new();
        finals.insert(exit);
        Ok(self.freeze(start, finals))
    }

    /// Lower a `regex-syntax` HIR via [`Expr::from_hir`] and compile it.
    ///
    /// A pattern matching only the empty string produces the one-state
    /// automaton whose start state is final.
    pub fn build_hir(&mut self, hir: &Hir) -> Result<Nfa, Error> {
        match Expr::from_hir(hir)? {
            Some(expr) => self.build(&expr),
            None => {
                self.states.clear();
                self.transitions.clear();
                self.epsilons.clear();

                let mut alloc = StateAllocator::default();
                let start = self.state(&mut alloc);

                let mut finals = IndexSet::new();
                finals.insert(start);
                Ok(self.freeze(start, finals))
            }
        }
    }

    // -- Low-level construction helpers --------------------------------------

    /// Allocate a fresh state and record it in the accumulator.
    fn state(&mut self, alloc: &mut StateAllocator) -> StateId {
        let id = alloc.allocate();
        self.states.push(id);
        id
    }

    fn transition(&mut self, src: StateId, input: Input, dst: StateId) {
        self.transitions.push(Transition { src, input, dst });
    }

    fn epsilon(&mut self, src: StateId, dst: StateId) {
        self.epsilons.push(Epsilon { src, dst });
    }

    /// Snapshot the accumulator into an immutable [`Nfa`] value.
    fn freeze(&self, start: StateId, finals: IndexSet<StateId>) -> Nfa {
        Nfa {
            states: self.states.to_vec().into_boxed_slice(),
            transitions: self.transitions.to_vec().into_boxed_slice(),
            epsilons: self.epsilons.to_vec().into_boxed_slice(),
            start,
            finals,
        }
    }

    // -- Per-node construction ------------------------------------------------

    /// Build the fragment for `expr` starting at `entry`; returns the
    /// fragment's exit state.
    ///
    /// Mutates only the accumulator; apart from that it behaves as a pure
    /// function of the node, the entry state and the allocator position.
    fn expr(&mut self, expr: &Expr, alloc: &mut StateAllocator, entry: StateId) -> StateId {
        match expr {
            Expr::Byte(b) => {
                let exit = self.state(alloc);
                self.transition(entry, Input::Byte(*b), exit);
                exit
            }
            Expr::Range { min, max } => {
                let exit = self.state(alloc);
                self.transition(
                    entry,
                    Input::Range {
                        min: *min,
                        max: *max,
                    },
                    exit,
                );
                exit
            }
            Expr::Wildcard => {
                let exit = self.state(alloc);
                self.transition(entry, Input::Any, exit);
                exit
            }
            // Fragments chain directly on their shared boundary state; no
            // epsilon glue.
            Expr::Concat(left, right) => {
                let mid = self.expr(left, alloc, entry);
                self.expr(right, alloc, mid)
            }
            // Two gateway states fan the branches out, a shared exit fans
            // them back in: exactly four epsilons per alternation.
            Expr::Alternate(left, right) => {
                let left_gateway = self.state(alloc);
                let right_gateway = self.state(alloc);
                let exit = self.state(alloc);
                self.epsilon(entry, left_gateway);
                self.epsilon(entry, right_gateway);
                let left_exit = self.expr(left, alloc, left_gateway);
                self.epsilon(left_exit, exit);
                let right_exit = self.expr(right, alloc, right_gateway);
                self.epsilon(right_exit, exit);
                exit
            }
            Expr::Repeat { sub, min, max } => self.repeat(sub, *min, *max, alloc, entry),
        }
    }

    /// Build `sub{min,max}`: a mandatory chain of exactly `min`
    /// occurrences followed by an optional phase for the rest.
    fn repeat(
        &mut self,
        sub: &Expr,
        min: Option<u32>,
        max: Option<u32>,
        alloc: &mut StateAllocator,
        entry: StateId,
    ) -> StateId {
        // Mandatory phase.  An absent or zero minimum is a no-op: the
        // phase exit is the entry itself.
        let min = min.unwrap_or(0);
        let mut exit = entry;
        for _ in 0..min {
            exit = self.expr(sub, alloc, exit);
        }

        match max {
            // Unbounded tail: one more instance, with an epsilon in each
            // direction between that instance's *own* entry and exit.
            // Attaching the pair to the instance boundary (rather than
            // the mandatory phase's boundary) keeps every mandatory
            // occurrence unskippable.
            None => {
                let instance_entry = exit;
                let instance_exit = self.expr(sub, alloc, instance_entry);
                self.epsilon(instance_entry, instance_exit);
                self.epsilon(instance_exit, instance_entry);
                instance_exit
            }
            // Exact count: the mandatory chain is the whole fragment — no
            // join state.
            Some(max) if max == min => exit,
            // Bounded tail: `max - min` further occurrences, each ramping
            // into one shared join state.  The epsilon from the phase
            // entry covers the zero-extra-repeats path.
            Some(max) => {
                let join = self.state(alloc);
                self.epsilon(exit, join);
                for _ in min..max {
                    exit = self.expr(sub, alloc, exit);
                    self.epsilon(exit, join);
                }
                join
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled NFA
// ---------------------------------------------------------------------------

/// A nondeterministic finite automaton.
///
/// Immutable once built: explicit lists of states (ascending identifier
/// order), consuming transitions and epsilon transitions (both in
/// creation order), a start state and a set of final states.  Handed
/// downstream to a matcher stage or to [`to_dot`](Self::to_dot).
#[derive(Debug)]
pub struct Nfa {
    states: Box<[StateId]>,
    transitions: Box<[Transition]>,
    epsilons: Box<[Epsilon]>,
    start: StateId,
    finals: IndexSet<StateId>,
}

impl Nfa {
    /// All states, in ascending identifier order.
    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    /// All consuming transitions, in creation order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// All epsilon transitions, in creation order.
    pub fn epsilons(&self) -> &[Epsilon] {
        &self.epsilons
    }

    /// The start state (always state 0).
    pub fn start(&self) -> StateId {
        self.start
    }

    /// The final states, in insertion order.
    pub fn finals(&self) -> impl Iterator<Item = StateId> + '_ {
        self.finals.iter().copied()
    }

    /// Whether `state` is a final state.
    pub fn is_final(&self, state: StateId) -> bool {
        self.finals.contains(&state)
    }

    /// Whether `state` belongs to this automaton.
    pub fn contains_state(&self, state: StateId) -> bool {
        // States are stored in ascending identifier order.
        self.states.binary_search(&state).is_ok()
    }

    /// Return the total memory footprint (in bytes) of this automaton,
    /// including both inline and heap-allocated data.
    ///
    /// This accounts for:
    /// - The `Nfa` struct itself (inline fields).
    /// - The `states`, `transitions` and `epsilons` boxed slices.
    /// - The final-state entries (hash-bucket overhead of the set is not
    ///   included).
    pub fn memory_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        let states_alloc = self.states.len() * std::mem::size_of::<StateId>();
        let transitions_alloc = self.transitions.len() * std::mem::size_of::<Transition>();
        let epsilons_alloc = self.epsilons.len() * std::mem::size_of::<Epsilon>();
        let finals_alloc = self.finals.len() * std::mem::size_of::<StateId>();
        inline + states_alloc + transitions_alloc + epsilons_alloc + finals_alloc
    }

    /// Emit a Graphviz DOT representation of the NFA.
    ///
    /// The output is deterministic: states are listed in ascending
    /// identifier order, edges in creation order and final-state markers
    /// in insertion order, so two renders of the same automaton are
    /// byte-identical.
    pub fn to_dot(&self, mut buffer: impl Write) {
        writeln!(buffer, "digraph nfa {{").unwrap();
        writeln!(buffer, "\trankdir=LR;").unwrap();
        for &state in self.states.iter() {
            writeln!(buffer, "\t{};", state).unwrap();
        }
        for t in self.transitions.iter() {
            writeln!(buffer, "\t{} -> {} [label=\"{}\"];", t.src, t.dst, t.input).unwrap();
        }
        for e in self.epsilons.iter() {
            writeln!(buffer, "\t{} -> {} [label=\"ε\"];", e.src, e.dst).unwrap();
        }
        for &state in &self.finals {
            writeln!(buffer, "\t{} [shape=doublecircle];", state).unwrap();
        }
        writeln!(buffer, "\t{} [shape=box];", self.start).unwrap();
        writeln!(buffer, "}}").unwrap();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
