//! Snowball tree: n-ary consensus over 256-bit IDs.
//!
//! Choices are arranged in a binary trie keyed on ID bits. A run of bits on
//! which every added choice agrees is voted on by one unary node; a bit on
//! which choices disagree is voted on by one binary node. Once a node
//! finalizes it is replaced by the child on its preferred side, so the trie
//! shrinks as bits get decided.

use std::fmt;
use std::sync::Arc;

use snow_ids::{Id, NUM_BITS};
use snow_utils::Bag;

use super::{Binary, Consensus, Factory, Unary};
use crate::Parameters;

struct TreeContext {
    params: Parameters,
    factory: Arc<dyn Factory>,
}

/// Tree-structured snowball [`Consensus`].
pub struct Tree {
    node: Node,
    ctx: TreeContext,
    /// Set after an unsuccessful poll; the reset is applied lazily on the next
    /// poll that reaches each node.
    should_reset: bool,
}

impl Tree {
    #[must_use]
    pub fn new(factory: Arc<dyn Factory>, params: Parameters, choice: Id) -> Self {
        let ctx = TreeContext { params, factory };
        let node = Node::Unary(UnaryNode::new(&ctx, choice, 0));
        Self {
            node,
            ctx,
            should_reset: false,
        }
    }
}

impl Consensus for Tree {
    fn add(&mut self, choice: Id) {
        // Choices that disagree with an already decided bit were rejected.
        let decided_prefix = self.node.decided_prefix();
        if Id::equal_subset(0, decided_prefix, &self.node.preference(), &choice) {
            self.node.add(&self.ctx, choice);
        }
    }

    fn preference(&self) -> Id {
        self.node.preference()
    }

    fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        let decided_prefix = self.node.decided_prefix();
        let preference = self.node.preference();
        let filtered = votes.filter(|id| Id::equal_subset(0, decided_prefix, &preference, id));

        let successful = self.node.record_poll(&self.ctx, &filtered, self.should_reset);
        self.should_reset = false;
        successful
    }

    fn record_unsuccessful_poll(&mut self) {
        self.should_reset = true;
    }

    fn finalized(&self) -> bool {
        self.node.finalized()
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(String::new(), &self.node)];
        let mut first = true;
        while let Some((prefix, node)) = stack.pop() {
            let (line, children) = node.printable();
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{prefix}{line}")?;

            let child_prefix = format!("{prefix}    ");
            stack.extend(children.into_iter().map(|child| (child_prefix.clone(), child)));
        }
        Ok(())
    }
}

enum Node {
    Unary(UnaryNode),
    Binary(BinaryNode),
}

impl Node {
    fn preference(&self) -> Id {
        match self {
            Self::Unary(u) => u.preference,
            Self::Binary(b) => b.preferences[b.snow.preference()],
        }
    }

    /// First bit this node votes on. All bits before it are decided.
    fn decided_prefix(&self) -> usize {
        match self {
            Self::Unary(u) => u.decided_prefix,
            Self::Binary(b) => b.bit,
        }
    }

    fn finalized(&self) -> bool {
        match self {
            Self::Unary(u) => u.snow.finalized(),
            Self::Binary(b) => b.snow.finalized(),
        }
    }

    fn add(&mut self, ctx: &TreeContext, choice: Id) {
        let replacement = match self {
            Self::Unary(u) => u.add(ctx, choice),
            Self::Binary(b) => {
                b.add(ctx, choice);
                None
            }
        };
        if let Some(node) = replacement {
            *self = node;
        }
    }

    fn record_poll(&mut self, ctx: &TreeContext, votes: &Bag<Id>, reset: bool) -> bool {
        let (replacement, successful) = match self {
            Self::Unary(u) => u.record_poll(ctx, votes, reset),
            Self::Binary(b) => b.record_poll(ctx, votes, reset),
        };
        if let Some(node) = replacement {
            *self = node;
        }
        successful
    }

    fn printable(&self) -> (String, Vec<&Node>) {
        match self {
            Self::Unary(u) => (
                format!("{} Bits = [{}, {})", u.snow, u.decided_prefix, u.common_prefix),
                u.child.as_deref().into_iter().collect(),
            ),
            Self::Binary(b) => {
                let line = format!("{} Bit = {}", b.snow, b.bit);
                if b.children[0].is_none() {
                    return (line, Vec::new());
                }
                // Pushed in reverse so the 0 side prints first.
                let children = [&b.children[1], &b.children[0]]
                    .into_iter()
                    .filter_map(|child| child.as_deref())
                    .collect();
                (line, children)
            }
        }
    }
}

/// Votes on the bits `[decided_prefix, common_prefix)`, which every choice
/// below this node shares.
struct UnaryNode {
    preference: Id,
    decided_prefix: usize,
    common_prefix: usize,
    snow: Box<dyn Unary>,
    should_reset: bool,
    child: Option<Box<Node>>,
}

impl UnaryNode {
    /// A node for `preference` with no conflicts from `decided_prefix` to the
    /// end of the ID.
    fn new(ctx: &TreeContext, preference: Id, decided_prefix: usize) -> Self {
        Self {
            preference,
            decided_prefix,
            common_prefix: NUM_BITS,
            snow: ctx.factory.new_unary(&ctx.params),
            should_reset: false,
            child: None,
        }
    }

    /// Moves the bits from `decided_prefix` onwards, and the child, into a
    /// new node with a copy of this node's confidence.
    fn split_off(&mut self, decided_prefix: usize) -> Self {
        Self {
            preference: self.preference,
            decided_prefix,
            common_prefix: self.common_prefix,
            snow: self.snow.clone_box(),
            should_reset: self.should_reset,
            child: self.child.take(),
        }
    }

    /// Adds `choice` below this node, splitting the bit range where it first
    /// disagrees with the preference. Returns the node that should take this
    /// node's place, if any.
    ///
    /// With the range `[d, c)` and the first difference at `i`:
    /// - no difference: the add is passed to the child
    /// - `d + 1 == c`: this node becomes a binary node on `d`
    /// - `i == d`: a binary node on `d` replaces this node, which keeps `[d+1, c)`
    /// - `i == c - 1`: this node keeps `[d, c-1)` above a binary node on `i`
    /// - otherwise: this node keeps `[d, i)` above a binary node on `i`, above
    ///   a copy of this node for `[i+1, c)`
    fn add(&mut self, ctx: &TreeContext, choice: Id) -> Option<Node> {
        if self.snow.finalized() {
            return None;
        }

        let Some(index) = Id::first_difference_subset(
            self.decided_prefix,
            self.common_prefix,
            &self.preference,
            &choice,
        ) else {
            // Adding a known choice to a leaf is a no-op.
            if let Some(child) = self.child.as_mut() {
                child.add(ctx, choice);
            }
            return None;
        };

        let bit = self.preference.bit(index);
        let mut b = BinaryNode {
            preferences: [Id::EMPTY; 2],
            bit: index,
            snow: self.snow.extend(bit),
            should_reset: [self.should_reset; 2],
            children: [None, None],
        };
        b.preferences[bit] = self.preference;
        b.preferences[1 - bit] = choice;

        // The new branch assumes every bit up to `index` was decided for it.
        let new_child = Box::new(Node::Unary(UnaryNode::new(ctx, choice, index + 1)));

        if self.decided_prefix + 1 == self.common_prefix {
            b.children[1 - bit] = self.child.is_some().then_some(new_child);
            b.children[bit] = self.child.take();
            return Some(Node::Binary(b));
        }

        if index == self.decided_prefix {
            b.children[bit] = Some(Box::new(Node::Unary(self.split_off(index + 1))));
            b.children[1 - bit] = Some(new_child);
            return Some(Node::Binary(b));
        }

        if index + 1 == self.common_prefix {
            self.common_prefix -= 1;
            b.children[1 - bit] = self.child.is_some().then_some(new_child);
            b.children[bit] = self.child.take();
            self.child = Some(Box::new(Node::Binary(b)));
            return None;
        }

        b.children[bit] = Some(Box::new(Node::Unary(self.split_off(index + 1))));
        b.children[1 - bit] = Some(new_child);
        self.common_prefix = index;
        self.should_reset = false;
        self.child = Some(Box::new(Node::Binary(b)));
        None
    }

    /// Votes are assumed to agree with the preference on this node's range.
    fn record_poll(
        &mut self,
        ctx: &TreeContext,
        votes: &Bag<Id>,
        reset: bool,
    ) -> (Option<Node>, bool) {
        // If the parent missed alpha, so did this node.
        if reset {
            self.snow.record_unsuccessful_poll();
            self.should_reset = true;
        }

        let num_votes = votes.len();
        if num_votes < ctx.params.alpha_preference {
            self.snow.record_unsuccessful_poll();
            self.should_reset = true;
            return (None, false);
        }

        self.snow.record_poll(num_votes);

        if let Some(child) = self.child.as_mut() {
            // The child starts where this node's range ends, so the votes
            // need no further filtering.
            child.record_poll(ctx, votes, self.should_reset);
            let child_preference = child.preference();
            if self.snow.finalized() {
                return (self.child.take().map(|child| *child), true);
            }
            self.preference = child_preference;
        }
        self.should_reset = false;
        (None, true)
    }
}

/// Votes on a single bit.
struct BinaryNode {
    /// Preferred choice on each side of the bit.
    preferences: [Id; 2],
    bit: usize,
    snow: Box<dyn Binary>,
    should_reset: [bool; 2],
    children: [Option<Box<Node>>; 2],
}

impl BinaryNode {
    fn add(&mut self, ctx: &TreeContext, choice: Id) {
        let bit = choice.bit(self.bit);
        // A missing child means this is the last bit and the choice is known.
        // A mismatch against the child's decided prefix means the choice was
        // already rejected.
        if let Some(child) = self.children[bit].as_mut() {
            if Id::equal_subset(
                self.bit + 1,
                child.decided_prefix(),
                &self.preferences[bit],
                &choice,
            ) {
                child.add(ctx, choice);
            }
        }
    }

    fn record_poll(
        &mut self,
        ctx: &TreeContext,
        votes: &Bag<Id>,
        reset: bool,
    ) -> (Option<Node>, bool) {
        let node_bit = self.bit;
        let split = votes.split(|id| id.bit(node_bit) == 1);

        // Which side won only matters if it can make the poll successful.
        let bit = usize::from(split[1].len() >= ctx.params.alpha_preference);

        if reset {
            self.snow.record_unsuccessful_poll();
            self.should_reset[bit] = true;
        }
        // The losing side missed alpha.
        self.should_reset[1 - bit] = true;

        let pruned = &split[bit];
        let num_votes = pruned.len();
        if num_votes < ctx.params.alpha_preference {
            self.snow.record_unsuccessful_poll();
            self.should_reset[bit] = true;
            return (None, false);
        }

        self.snow.record_poll(num_votes, bit);

        if let Some(child) = self.children[bit].as_mut() {
            let decided_prefix = child.decided_prefix();
            let preference = self.preferences[bit];
            let filtered = pruned.filter(|id| {
                Id::equal_subset(node_bit + 1, decided_prefix, &preference, id)
            });

            child.record_poll(ctx, &filtered, self.should_reset[bit]);
            let child_preference = child.preference();
            if self.snow.finalized() {
                // Finalizing during this poll means `bit` won.
                return (self.children[bit].take().map(|child| *child), true);
            }
            self.preferences[bit] = child_preference;
        }
        self.should_reset[bit] = false;
        (None, true)
    }
}
