//! Greedy arena planner
//!
//! Each activation tensor gets a lifetime `[first, last]` in operator order.
//! Tensors are placed largest first at the lowest aligned offset that does
//! not collide with an already placed tensor whose lifetime overlaps.

use crate::arena::align_up;
use crate::model::ModelDef;
use crate::InferenceError;

/// Byte range of a tensor inside the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: usize,
    pub len: usize,
}

impl Placement {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

#[derive(Debug, Clone, Copy)]
struct Lifetime {
    first: usize,
    last: usize,
}

impl Lifetime {
    fn overlaps(&self, other: &Lifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Arena layout for every activation tensor of a model
#[derive(Debug, Clone)]
pub struct MemoryPlan {
    /// Indexed by tensor id; `None` for constants and unused tensors
    pub placements: Vec<Option<Placement>>,
    /// Bytes of arena needed by the plan
    pub required: usize,
}

/// Compute tensor lifetimes and place them in the arena
pub fn plan(model: &ModelDef<'_>) -> Result<MemoryPlan, InferenceError> {
    let op_count = model.operators.len();
    let mut lifetimes: Vec<Option<Lifetime>> = vec![None; model.tensors.len()];

    let mut touch = |id: usize, at: usize| {
        let entry = lifetimes[id].get_or_insert(Lifetime { first: at, last: at });
        entry.first = entry.first.min(at);
        entry.last = entry.last.max(at);
    };

    // Graph input and output live for the whole invocation
    let whole = op_count.saturating_sub(1);
    for &id in model.inputs.iter().chain(model.outputs.iter()) {
        touch(id as usize, 0);
        touch(id as usize, whole);
    }

    let mut produced = vec![false; model.tensors.len()];
    for &id in &model.inputs {
        produced[id as usize] = true;
    }

    for (index, op) in model.operators.iter().enumerate() {
        for &id in &op.inputs {
            let id = id as usize;
            if model.tensors[id].is_constant() {
                continue;
            }
            if !produced[id] {
                return Err(InferenceError::InvalidModel(format!(
                    "tensor {} is read by operator {} before it is written",
                    model.tensors[id].name, index
                )));
            }
            touch(id, index);
        }
        for &id in &op.outputs {
            let id = id as usize;
            if model.tensors[id].is_constant() {
                return Err(InferenceError::InvalidModel(format!(
                    "operator {} writes constant tensor {}",
                    index, model.tensors[id].name
                )));
            }
            produced[id] = true;
            touch(id, index);
        }
    }

    for &id in &model.outputs {
        if !produced[id as usize] {
            return Err(InferenceError::InvalidModel(format!(
                "graph output {} is never written",
                model.tensors[id as usize].name
            )));
        }
    }

    let sizes = model
        .tensors
        .iter()
        .map(|t| t.byte_len().ok_or_else(|| too_large(t.name)))
        .collect::<Result<Vec<usize>, _>>()?;

    let mut order: Vec<usize> = (0..model.tensors.len()).filter(|&id| lifetimes[id].is_some()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));

    let mut placements: Vec<Option<Placement>> = vec![None; model.tensors.len()];
    let mut placed: Vec<usize> = Vec::with_capacity(order.len());
    let mut required = 0;

    for id in order {
        let lifetime = lifetimes[id].ok_or_else(|| InferenceError::InvalidModel("unplanned tensor".into()))?;
        let len = sizes[id];

        let mut conflicts: Vec<Placement> = placed
            .iter()
            .filter(|&&other| lifetimes[other].is_some_and(|l| l.overlaps(&lifetime)))
            .filter_map(|&other| placements[other])
            .collect();
        conflicts.sort_by_key(|p| p.offset);

        let mut offset: usize = 0;
        for conflict in &conflicts {
            if offset.checked_add(len).is_some_and(|end| end <= conflict.offset) {
                break;
            }
            offset = offset.max(align_up(conflict.end()));
        }

        // keeps every end (and its aligned successor) addressable
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= isize::MAX as usize)
            .ok_or_else(|| too_large(model.tensors[id].name))?;

        let placement = Placement { offset, len };
        required = required.max(end);
        placements[id] = Some(placement);
        placed.push(id);
    }

    Ok(MemoryPlan { placements, required })
}

fn too_large(name: &str) -> InferenceError {
    InferenceError::InvalidModel(format!("tensor {} is too large to place", name))
}
