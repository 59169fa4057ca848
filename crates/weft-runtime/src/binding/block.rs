#![forbid(unsafe_code)]

//! Renderable unit mounted at a child position.

use std::fmt;

use weft_core::{NodeId, WeftError};

use super::{Binding, disconnected};
use crate::block::Block;
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::Value;

/// Binding of a [`Block`] to a child part.
///
/// The block owns its content; this binding only drives its lifecycle.
/// Unbinding suspends the block, binding the same block again resumes it.
pub struct BlockBinding {
    part: Part,
    block: Block,
    connected: bool,
    disconnected: bool,
}

impl BlockBinding {
    #[must_use]
    pub fn new(part: Part, block: Block) -> Self {
        Self {
            part,
            block,
            connected: false,
            disconnected: false,
        }
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }
}

impl Binding for BlockBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::Block(block) if block.ptr_eq(&self.block))
    }

    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        if self.disconnected {
            return Err(disconnected());
        }
        self.block.attach(self.part.clone(), cx)?;
        self.connected = true;
        Ok(())
    }

    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        if self.disconnected {
            return Err(disconnected());
        }
        if !self.accepts(&value) {
            return Err(super::unsupported(&self.part, &value));
        }
        if !self.connected {
            return self.connect(cx);
        }
        self.block.resume(cx);
        Ok(())
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        if self.connected && !self.disconnected {
            self.block.suspend(cx);
        }
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        self.connected = false;
        self.block.disconnect();
    }

    fn commit(&mut self, _cx: &CommitContext<'_>) -> Result<(), WeftError> {
        // Content commits through the bindings inside the block.
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        self.block.committed_nodes(out);
    }

    fn first_committed_node(&self) -> Option<NodeId> {
        self.block.first_committed_node()
    }
}

impl fmt::Debug for BlockBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBinding")
            .field("part", &self.part)
            .field("block", &self.block)
            .field("connected", &self.connected)
            .finish()
    }
}
