//! Graph interpreter bound to a planned arena

use tracing::debug;

use crate::arena::Arena;
use crate::model::{ModelDef, OpCode};
use crate::ops::{opcode_name, EvalContext, Kernel, PrepareContext};
use crate::planner::{self, Placement};
use crate::resolver::OpResolver;
use crate::tensor::{Layout, TensorInfo, TensorView, TensorViewMut};
use crate::InferenceError;

struct Step<'m> {
    opcode: OpCode,
    kernel: Kernel<'m>,
}

/// Prepared operators plus the tensor placements they run over
pub(crate) struct Interpreter<'m> {
    infos: Vec<TensorInfo>,
    placements: Vec<Option<Placement>>,
    steps: Vec<Step<'m>>,
    input: usize,
    output: usize,
    input_layout: Layout,
}

impl<'m> Interpreter<'m> {
    /// Resolve kernels, plan the arena, and prepare every operator
    pub fn build<const N: usize>(
        model: &ModelDef<'m>,
        resolver: &OpResolver<N>,
        arena: &mut Arena,
    ) -> Result<Self, InferenceError> {
        let prepares = model
            .operators
            .iter()
            .map(|op| resolver.find(op.opcode).ok_or(InferenceError::UnsupportedOperator(op.opcode)))
            .collect::<Result<Vec<_>, _>>()?;

        let plan = planner::plan(model)?;
        arena.commit(plan.required)?;
        debug!(
            "Planned {} tensors into {} of {} arena bytes",
            plan.placements.iter().flatten().count(),
            plan.required,
            arena.capacity()
        );

        let infos: Vec<TensorInfo> = model.tensors.iter().map(|t| t.info()).collect();
        let ctx = PrepareContext {
            tensors: &model.tensors,
            infos: &infos,
        };

        let mut steps = Vec::with_capacity(model.operators.len());
        for (index, (op, prepare)) in model.operators.iter().zip(prepares).enumerate() {
            let kernel = prepare(op, &ctx)?;
            debug!("Prepared operator {} ({})", index, opcode_name(op.opcode));
            steps.push(Step {
                opcode: op.opcode,
                kernel,
            });
        }

        Ok(Self {
            infos,
            placements: plan.placements,
            steps,
            input: model.input() as usize,
            output: model.output() as usize,
            input_layout: model.input_layout,
        })
    }

    /// Run every operator in order. Allocation-free.
    pub fn invoke(&self, arena: &mut Arena) -> Result<(), InferenceError> {
        let mut ctx = EvalContext {
            arena: arena.bytes_mut(),
            placements: &self.placements,
        };
        for (index, step) in self.steps.iter().enumerate() {
            step.kernel.eval(&mut ctx).map_err(|reason| InferenceError::Kernel {
                index,
                opcode: step.opcode,
                reason,
            })?;
        }
        Ok(())
    }

    fn range(&self, id: usize) -> Result<std::ops::Range<usize>, InferenceError> {
        self.placements
            .get(id)
            .copied()
            .flatten()
            .map(|p| p.range())
            .ok_or_else(|| InferenceError::InvalidModel(format!("tensor {} is not arena-resident", id)))
    }

    pub fn view<'a>(&'a self, arena: &'a Arena, id: usize) -> Result<TensorView<'a>, InferenceError> {
        let range = self.range(id)?;
        Ok(TensorView::new(&self.infos[id], &arena.bytes()[range]))
    }

    pub fn view_mut<'a>(&'a self, arena: &'a mut Arena, id: usize) -> Result<TensorViewMut<'a>, InferenceError> {
        let range = self.range(id)?;
        Ok(TensorViewMut::new(&self.infos[id], &mut arena.bytes_mut()[range]))
    }

    pub fn input(&self) -> usize {
        self.input
    }

    pub fn output(&self) -> usize {
        self.output
    }

    pub fn input_layout(&self) -> Layout {
        self.input_layout
    }

    pub fn operator_count(&self) -> usize {
        self.steps.len()
    }
}
