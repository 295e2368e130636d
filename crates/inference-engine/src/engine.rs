//! Inference Engine Implementation

use serde::Serialize;
use tracing::{debug, error, info};

use crate::arena::Arena;
use crate::interpreter::Interpreter;
use crate::model::ModelDef;
use crate::resolver::OpResolver;
use crate::tensor::{Layout, TensorView, TensorViewMut};
use crate::{InferenceError, TENSOR_ARENA_SIZE};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, `init()` not yet called
    Uninitialized,
    /// `init()` in progress
    Initializing,
    /// Tensors allocated, input and output bound
    Ready,
    /// A forward pass is running
    Invoking,
    /// `init()` failed; reconstruct the engine to retry
    Failed,
}

impl EngineState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Invoking => "invoking",
            EngineState::Failed => "failed",
        }
    }
}

/// Fixed-arena model interpreter.
///
/// Borrows the model blob for `'m`; constant weights are read in place and
/// never copied. Every activation lives in one arena of `ARENA_SIZE` bytes
/// allocated by `init()` and released when the engine is dropped.
pub struct InferenceEngine<'m, const ARENA_SIZE: usize = TENSOR_ARENA_SIZE> {
    model_data: &'m [u8],
    state: EngineState,
    arena: Option<Arena>,
    interpreter: Option<Interpreter<'m>>,
}

impl<'m, const ARENA_SIZE: usize> InferenceEngine<'m, ARENA_SIZE> {
    /// Create a new inference engine over a model blob
    pub fn new(model_data: &'m [u8]) -> Self {
        info!(
            "Creating inference engine: {} byte model, {} byte arena",
            model_data.len(),
            ARENA_SIZE
        );
        Self {
            model_data,
            state: EngineState::Uninitialized,
            arena: None,
            interpreter: None,
        }
    }

    /// Validate the model, link the gesture operator set, allocate the arena
    /// and tensors, and bind input and output.
    ///
    /// Fails closed: on error the engine moves to `Failed` and every accessor
    /// refuses use.
    pub fn init(&mut self) -> Result<(), InferenceError> {
        match self.state {
            EngineState::Ready => return Ok(()),
            EngineState::Uninitialized => {}
            other => return Err(InferenceError::NotReady(other)),
        }

        self.state = EngineState::Initializing;
        match self.build() {
            Ok((arena, interpreter)) => {
                info!(
                    "Inference engine ready: {} operators, arena {}/{} bytes used",
                    interpreter.operator_count(),
                    arena.used(),
                    arena.capacity()
                );
                self.arena = Some(arena);
                self.interpreter = Some(interpreter);
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Inference engine init failed: {}", e);
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    fn build(&self) -> Result<(Arena, Interpreter<'m>), InferenceError> {
        let model = ModelDef::parse(self.model_data)?;
        debug!(
            "Parsed model: {} tensors, {} operators",
            model.tensors.len(),
            model.operators.len()
        );
        let resolver = OpResolver::gesture()?;
        let mut arena = Arena::new(ARENA_SIZE)?;
        let interpreter = Interpreter::build(&model, &resolver, &mut arena)?;
        Ok((arena, interpreter))
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Check if engine is ready to invoke
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    fn ready(&self) -> Result<(&Interpreter<'m>, &Arena), InferenceError> {
        match (&self.state, &self.interpreter, &self.arena) {
            (EngineState::Ready, Some(interpreter), Some(arena)) => Ok((interpreter, arena)),
            _ => Err(InferenceError::NotReady(self.state)),
        }
    }

    /// Read-only view of the graph input
    pub fn input(&self) -> Result<TensorView<'_>, InferenceError> {
        let (interpreter, arena) = self.ready()?;
        interpreter.view(arena, interpreter.input())
    }

    /// Writable view of the graph input
    pub fn input_mut(&mut self) -> Result<TensorViewMut<'_>, InferenceError> {
        match (&self.state, &self.interpreter, &mut self.arena) {
            (EngineState::Ready, Some(interpreter), Some(arena)) => interpreter.view_mut(arena, interpreter.input()),
            _ => Err(InferenceError::NotReady(self.state)),
        }
    }

    /// Read-only view of the graph output
    pub fn output(&self) -> Result<TensorView<'_>, InferenceError> {
        let (interpreter, arena) = self.ready()?;
        interpreter.view(arena, interpreter.output())
    }

    /// Run one forward pass over the current input.
    ///
    /// A failed pass leaves the engine `Ready`; the output is then stale.
    pub fn invoke(&mut self) -> Result<(), InferenceError> {
        let (EngineState::Ready, Some(interpreter), Some(arena)) = (self.state, &self.interpreter, &mut self.arena)
        else {
            return Err(InferenceError::NotReady(self.state));
        };

        self.state = EngineState::Invoking;
        let result = interpreter.invoke(arena);
        self.state = EngineState::Ready;
        result
    }

    /// Layout of the graph input image
    pub fn input_layout(&self) -> Result<Layout, InferenceError> {
        self.ready().map(|(interpreter, _)| interpreter.input_layout())
    }

    /// Arena bytes claimed by planned tensors; zero before `init()`
    pub fn arena_used_bytes(&self) -> usize {
        self.arena.as_ref().map_or(0, Arena::used)
    }

    /// Arena capacity in bytes
    pub fn arena_capacity(&self) -> usize {
        ARENA_SIZE
    }
}

impl<const ARENA_SIZE: usize> Drop for InferenceEngine<'_, ARENA_SIZE> {
    fn drop(&mut self) {
        if self.arena.take().is_some() {
            debug!("Released {} byte tensor arena", ARENA_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_refuse_before_init() {
        let mut engine: InferenceEngine<'_> = InferenceEngine::new(&[]);
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(
            engine.input(),
            Err(InferenceError::NotReady(EngineState::Uninitialized))
        ));
        assert!(engine.input_mut().is_err());
        assert!(engine.output().is_err());
        assert!(matches!(
            engine.invoke(),
            Err(InferenceError::NotReady(EngineState::Uninitialized))
        ));
        assert_eq!(engine.arena_used_bytes(), 0);
    }

    #[test]
    fn test_bad_blob_fails_closed() {
        let mut engine: InferenceEngine<'_> = InferenceEngine::new(b"not a model");
        assert!(matches!(engine.init(), Err(InferenceError::BadMagic { .. })));
        assert_eq!(engine.state(), EngineState::Failed);
        assert!(!engine.is_ready());
        assert!(engine.invoke().is_err());
        // no silent retry on a failed engine
        assert!(matches!(engine.init(), Err(InferenceError::NotReady(EngineState::Failed))));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EngineState::Ready).unwrap(), "\"ready\"");
        assert_eq!(EngineState::Uninitialized.as_str(), "uninitialized");
    }
}
