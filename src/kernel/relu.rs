use super::{ComputeContext, Kernel, KernelError, MemoryRequirements, SetupContext};
use crate::{
    device::{DeviceError, KernelRegistry},
    graph::{
        operator::Operator,
        shape::Shape,
        variable::{LocalVariable, Variable},
    },
};

/// Rectifier configuration shared by the forward and gradient kernels.
///
/// A zero negative slope is the plain rectifier; a small positive slope
/// makes it leaky.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReluConf {
    negative_slope: f32,
}

impl ReluConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_negative_slope(mut self, negative_slope: f32) -> Self {
        self.negative_slope = negative_slope;
        self
    }

    #[inline]
    pub fn negative_slope(&self) -> f32 {
        self.negative_slope
    }
}

/// Shapes, variable pools and memory footprint fixed by `setup`.
#[derive(Debug)]
struct State {
    input: LocalVariable,
    output: LocalVariable,
    requirements: MemoryRequirements,
}

/// The rectifier forward pass: positive inputs pass through, negative
/// inputs are scaled by the configured slope.
#[derive(Debug)]
pub struct Relu {
    conf: ReluConf,
    state: Option<State>,
}

impl Relu {
    pub fn new(conf: ReluConf) -> Self {
        let state = None;
        Self { conf, state }
    }
}

impl Kernel for Relu {
    fn name(&self) -> &'static str {
        "Relu"
    }

    fn setup(&mut self, ctx: SetupContext) -> Result<(), KernelError> {
        if ctx.input.len() != 1 {
            return Err(KernelError::Arity {
                operator: ctx.name.into(),
                count: ctx.input.len(),
            });
        }

        let input = Variable::new("input", ctx.input[0].clone(), true);
        log::debug!("input variable {} {}", input.name(), input.shape());

        let output = Variable::new("output", ctx.input[0].clone(), true);
        log::debug!("output variable {} {}", output.name(), output.shape());

        let mut requirements = MemoryRequirements::default();
        requirements.set_output(output.capacity());
        // no model variables and no private scratch space

        self.state = Some(State {
            input: LocalVariable::new(input, ctx.slots),
            output: LocalVariable::new(output, ctx.slots),
            requirements,
        });
        Ok(())
    }

    fn register(
        &self,
        operator: &Operator,
        registry: &dyn KernelRegistry,
    ) -> Result<(), DeviceError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| DeviceError::Setup(operator.name().into()))?;
        let id = operator.id();

        // 1 input, 0 local variables, 1 output
        registry.set_kernel(id, self.name(), 1, 0, 1, self.is_loss() || self.is_accuracy())?;

        let input = state.input.initial();
        registry.set_kernel_input(id, 0, input.shape(), input.capacity())?;

        let output = state.output.initial();
        registry.set_kernel_output(id, output.shape(), output.capacity())?;

        registry.set_configuration_count(id, 1)?;
        registry.set_configuration_f32(id, 0, "slope", self.conf.negative_slope())?;
        Ok(())
    }

    fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| KernelError::Setup(ctx.name().into()))?;
        let previous = ctx.operator().previous();
        if previous.len() > 1 {
            return Err(KernelError::Arity {
                operator: ctx.name().into(),
                count: previous.len(),
            });
        }

        let input = state.input.get(ctx.slot());
        let mut output = state.output.get(ctx.slot());

        let window = ctx.current_input()?;
        let output_buffer = ctx.current_output();
        output.wrap(output_buffer.clone());

        let slope = self.conf.negative_slope();
        let elements = input.shape().size();
        let size = input.data_type().size();

        let input_data = window.buffer.read();
        let mut output_data = output_buffer.write();

        for index in 0..elements {
            let offset = index * size;
            let input_offset = offset + window.start;
            if input_offset >= window.end {
                return Err(KernelError::Overflow {
                    offset: input_offset,
                    end: window.end,
                });
            }

            let value = input_data.get_f32(input_offset);
            match value > 0.0 {
                true => output_data.put_f32(offset, value),
                false => output_data.put_f32(offset, slope * value),
            }
        }

        drop(output_data);
        ctx.batch().set_output(ctx.operator().id(), output_buffer);
        Ok(())
    }

    fn memory_requirements(&self) -> MemoryRequirements {
        self.state
            .as_ref()
            .map(|state| state.requirements)
            .unwrap_or_default()
    }

    fn output_shape(&self) -> Option<&Shape> {
        self.state
            .as_ref()
            .map(|state| state.output.initial().shape())
    }
}

/// The rectifier gradient pass.
///
/// Mirrors the forward decision rule without recomputing it: the branch is
/// taken on the forward peer's stored pre-activation value, so the peer's
/// input buffer must stay alive until the gradient pass runs.
#[derive(Debug)]
pub struct ReluGradient {
    conf: ReluConf,
    state: Option<State>,
}

impl ReluGradient {
    pub fn new(conf: ReluConf) -> Self {
        let state = None;
        Self { conf, state }
    }
}

impl Kernel for ReluGradient {
    fn name(&self) -> &'static str {
        "ReluGradient"
    }

    fn setup(&mut self, ctx: SetupContext) -> Result<(), KernelError> {
        if ctx.input.len() != 1 {
            return Err(KernelError::Arity {
                operator: ctx.name.into(),
                count: ctx.input.len(),
            });
        }
        let peer = ctx.peer.ok_or_else(|| KernelError::MissingPeer {
            operator: ctx.name.into(),
        })?;
        if peer.input.len() != 1 {
            return Err(KernelError::PeerArity {
                peer: peer.name.clone(),
                count: peer.input.len(),
            });
        }

        let input = Variable::new("input", ctx.input[0].clone(), true);
        log::debug!("input variable {} {}", input.name(), input.shape());

        // the output of a gradient operator has the shape of its forward
        // peer's input, not of the peer's output
        let output = Variable::new("output", peer.input[0].clone(), true);
        log::debug!("output variable {} {}", output.name(), output.shape());

        let mut requirements = MemoryRequirements::default();
        requirements.set_output(output.capacity());
        // no model variables and no private scratch space

        self.state = Some(State {
            input: LocalVariable::new(input, ctx.slots),
            output: LocalVariable::new(output, ctx.slots),
            requirements,
        });
        Ok(())
    }

    fn register(
        &self,
        operator: &Operator,
        registry: &dyn KernelRegistry,
    ) -> Result<(), DeviceError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| DeviceError::Setup(operator.name().into()))?;
        let id = operator.id();

        // 1 input, 0 local variables, 1 output
        registry.set_kernel(id, self.name(), 1, 0, 1, self.is_loss() || self.is_accuracy())?;

        let input = state.input.initial();
        registry.set_kernel_input(id, 0, input.shape(), input.capacity())?;

        let output = state.output.initial();
        registry.set_kernel_output(id, output.shape(), output.capacity())?;

        registry.set_configuration_count(id, 1)?;
        registry.set_configuration_f32(id, 0, "slope", self.conf.negative_slope())?;
        Ok(())
    }

    fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| KernelError::Setup(ctx.name().into()))?;
        let previous = ctx.operator().previous();
        if previous.len() > 1 {
            return Err(KernelError::Arity {
                operator: ctx.name().into(),
                count: previous.len(),
            });
        }

        let input = state.input.get(ctx.slot());
        let mut output = state.output.get(ctx.slot());

        let window = ctx.current_input()?;
        let output_buffer = ctx.current_output();
        output.wrap(output_buffer.clone());

        let peer_buffer = ctx.peer_input()?;

        let slope = self.conf.negative_slope();
        let elements = input.shape().size();
        let size = input.data_type().size();

        let input_data = window.buffer.read();
        let peer_data = peer_buffer.read();
        let mut output_data = output_buffer.write();

        for index in 0..elements {
            let offset = index * size;
            let input_offset = offset + window.start;
            if input_offset >= window.end {
                return Err(KernelError::Overflow {
                    offset: input_offset,
                    end: window.end,
                });
            }

            let gradient = input_data.get_f32(input_offset);
            // the peer's stored pre-activation decides the branch; read it
            // at the unshifted offset and trust it rather than recompute
            let peer_value = peer_data.get_f32(offset);
            match peer_value > 0.0 {
                true => output_data.put_f32(offset, gradient),
                false => output_data.put_f32(offset, slope * gradient),
            }
        }

        drop(output_data);
        ctx.batch().set_output(ctx.operator().id(), output_buffer);
        Ok(())
    }

    fn memory_requirements(&self) -> MemoryRequirements {
        self.state
            .as_ref()
            .map(|state| state.requirements)
            .unwrap_or_default()
    }

    fn output_shape(&self) -> Option<&Shape> {
        self.state
            .as_ref()
            .map(|state| state.output.initial().shape())
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::{Relu, ReluConf, ReluGradient};
    use crate::{
        graph::{
            batch::Batch,
            buffer::DataBuffer,
            model::Model,
            operator::{Graph, OperatorId},
            shape::Shape,
        },
        kernel::{ComputeContext, Kernel, KernelError, MemoryRequirements, Peer, SetupContext},
    };

    /// Emits fixed contents, standing in for an upstream operator.
    #[derive(Debug)]
    struct Inject {
        values: Vec<f32>,
        shape: Option<Shape>,
    }

    impl Inject {
        fn new(values: Vec<f32>) -> Self {
            let shape = None;
            Self { values, shape }
        }
    }

    impl Kernel for Inject {
        fn name(&self) -> &'static str {
            "Inject"
        }

        fn setup(&mut self, ctx: SetupContext) -> Result<(), KernelError> {
            self.shape = Some(ctx.input[0].clone());
            Ok(())
        }

        fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError> {
            let buffer = DataBuffer::create::<f32>(&self.values);
            ctx.batch().set_output(ctx.operator().id(), buffer);
            Ok(())
        }

        fn memory_requirements(&self) -> MemoryRequirements {
            let mut requirements = MemoryRequirements::default();
            requirements.set_output(4 * self.values.len());
            requirements
        }

        fn output_shape(&self) -> Option<&Shape> {
            self.shape.as_ref()
        }
    }

    fn setup_gradient(conf: ReluConf, input: Shape, peer: &Peer, slots: usize) -> ReluGradient {
        let mut kernel = ReluGradient::new(conf);
        let model = Model::new();
        kernel
            .setup(SetupContext {
                name: "relu-gradient",
                input: &[input],
                peer: Some(peer),
                slots,
                model: &model,
            })
            .expect("setup");
        kernel
    }

    /// Forward peer at the head of the graph, gradient fed by an injected
    /// upstream. The batch input holds the pre-activations the peer saw.
    fn gradient_graph(
        conf: ReluConf,
        gradient: Vec<f32>,
        slots: usize,
    ) -> (Graph, OperatorId, OperatorId, OperatorId) {
        let shape = Shape::from([gradient.len()]);
        let mut graph = Graph::new(slots);
        let forward = graph
            .push("relu", Box::new(Relu::new(conf)), vec![shape.clone()], vec![], None)
            .expect("push forward");
        let inject = graph
            .push("inject", Box::new(Inject::new(gradient)), vec![shape.clone()], vec![], None)
            .expect("push inject");
        let backward = graph
            .push(
                "relu-gradient",
                Box::new(ReluGradient::new(conf)),
                vec![shape],
                vec![inject],
                Some(forward),
            )
            .expect("push gradient");
        (graph, forward, inject, backward)
    }

    #[test]
    fn test_output_shape_follows_peer_input() {
        let peer = Peer {
            name: "relu".into(),
            input: vec![Shape::from([2, 3])],
        };
        let kernel = setup_gradient(ReluConf::new(), Shape::from([6]), &peer, 1);

        // peer input shape, not the gradient's own input shape
        assert_eq!(kernel.output_shape(), Some(&Shape::from([2, 3])));
        assert_eq!(kernel.memory_requirements().output(), 24);
        assert_eq!(kernel.memory_requirements().model(), 0);
        assert_eq!(kernel.memory_requirements().local_cpu(), 0);
        assert_eq!(kernel.memory_requirements().local_gpu(), 0);
    }

    #[test]
    fn test_setup_rejects_multi_input_peer() {
        let peer = Peer {
            name: "concat".into(),
            input: vec![Shape::from([2]), Shape::from([2])],
        };
        let mut kernel = ReluGradient::new(ReluConf::new());
        let model = Model::new();
        let result = kernel.setup(SetupContext {
            name: "relu-gradient",
            input: &[Shape::from([4])],
            peer: Some(&peer),
            slots: 1,
            model: &model,
        });
        assert!(matches!(result, Err(KernelError::PeerArity { .. })));
    }

    #[test]
    fn test_setup_again_with_bad_arity_keeps_no_stale_state() {
        let peer = Peer {
            name: "relu".into(),
            input: vec![Shape::from([4])],
        };
        let mut kernel = setup_gradient(ReluConf::new(), Shape::from([4]), &peer, 1);

        let model = Model::new();
        let result = kernel.setup(SetupContext {
            name: "relu-gradient",
            input: &[Shape::from([4]), Shape::from([4])],
            peer: Some(&peer),
            slots: 1,
            model: &model,
        });
        assert!(matches!(result, Err(KernelError::Arity { count: 2, .. })));

        // the failed call must not have touched the configuration
        assert_eq!(kernel.output_shape(), Some(&Shape::from([4])));
    }

    #[test]
    fn test_gradient_values() {
        let conf = ReluConf::new().with_negative_slope(0.1);
        let (mut graph, forward, inject, backward) = gradient_graph(conf, vec![3.0; 4], 1);
        let model = Model::new();
        graph.setup(&model).expect("setup");

        let batch = Batch::new(DataBuffer::create::<f32>(&[-2.0, 2.0, 0.0, -0.5]));
        graph.compute(forward, &batch, &model, 0).expect("forward");
        graph.compute(inject, &batch, &model, 0).expect("inject");
        graph.compute(backward, &batch, &model, 0).expect("backward");

        // negative or zero pre-activation scales by the slope, positive
        // passes the gradient through
        let output = batch.output_of(backward).expect("output");
        let values = output.to_vec::<f32>();
        assert_eq!(values.len(), 4);
        for (value, reference) in values.iter().zip_eq([0.3, 3.0, 0.3, 0.3]) {
            assert!((value - reference).abs() < 1e-6, "{value} != {reference}");
        }
    }

    #[test]
    fn test_gradient_identity_with_unit_slope() {
        let conf = ReluConf::new().with_negative_slope(1.0);
        let gradient = vec![3.0, -1.5, 0.25, 8.0];
        let (mut graph, forward, inject, backward) = gradient_graph(conf, gradient.clone(), 1);
        let model = Model::new();
        graph.setup(&model).expect("setup");

        // all pre-activations at or below zero
        let batch = Batch::new(DataBuffer::create::<f32>(&[-2.0, 0.0, -0.5, -8.0]));
        graph.compute(forward, &batch, &model, 0).expect("forward");
        graph.compute(inject, &batch, &model, 0).expect("inject");
        graph.compute(backward, &batch, &model, 0).expect("backward");

        let output = batch.output_of(backward).expect("output");
        assert_eq!(output.to_vec::<f32>(), gradient);
    }

    #[test]
    fn test_forward_values() {
        let conf = ReluConf::new().with_negative_slope(0.1);
        let shape = Shape::from([4]);
        let mut graph = Graph::new(1);
        let forward = graph
            .push("relu", Box::new(Relu::new(conf)), vec![shape], vec![], None)
            .expect("push");
        let model = Model::new();
        graph.setup(&model).expect("setup");

        let batch = Batch::new(DataBuffer::create::<f32>(&[-2.0, 2.0, 0.0, 4.5]));
        graph.compute(forward, &batch, &model, 0).expect("forward");

        let output = batch.output_of(forward).expect("output");
        let values = output.to_vec::<f32>();
        for (value, reference) in values.iter().zip_eq([-0.2, 2.0, 0.0, 4.5]) {
            assert!((value - reference).abs() < 1e-6, "{value} != {reference}");
        }
    }

    #[test]
    fn test_window_end_overflows() {
        let conf = ReluConf::new();
        let shape = Shape::from([4]);
        let mut graph = Graph::new(1);
        let forward = graph
            .push("relu", Box::new(Relu::new(conf)), vec![shape], vec![], None)
            .expect("push");
        let model = Model::new();
        graph.setup(&model).expect("setup");

        // the window covers two of the four elements the shape declares
        let buffer = DataBuffer::create::<f32>(&[1.0, 2.0, 3.0, 4.0]);
        let batch = Batch::with_window(buffer, 0, 8);
        let result = graph.compute(forward, &batch, &model, 0);
        assert!(matches!(
            result,
            Err(crate::graph::GraphError::Kernel(KernelError::Overflow {
                offset: 8,
                end: 8,
            }))
        ));
        // a failed kernel registers no output
        assert!(batch.output_of(forward).is_none());
    }

    #[test]
    fn test_gradient_window_end_overflows() {
        let conf = ReluConf::new().with_negative_slope(0.1);
        let shape = Shape::from([4]);
        let mut graph = Graph::new(1);
        let forward = graph
            .push("relu", Box::new(Relu::new(conf)), vec![shape.clone()], vec![], None)
            .expect("push forward");
        // the upstream produces two elements where the shape declares four
        let inject = graph
            .push(
                "inject",
                Box::new(Inject::new(vec![3.0, 3.0])),
                vec![Shape::from([2])],
                vec![],
                None,
            )
            .expect("push inject");
        let backward = graph
            .push(
                "relu-gradient",
                Box::new(ReluGradient::new(conf)),
                vec![shape],
                vec![inject],
                Some(forward),
            )
            .expect("push gradient");
        let model = Model::new();
        graph.setup(&model).expect("setup");

        let batch = Batch::new(DataBuffer::zeros(16));
        graph.compute(inject, &batch, &model, 0).expect("inject");
        let result = graph.compute(backward, &batch, &model, 0);
        assert!(matches!(
            result,
            Err(crate::graph::GraphError::Kernel(KernelError::Overflow {
                offset: 8,
                end: 8,
            }))
        ));
        assert!(batch.output_of(backward).is_none());
    }

    #[test]
    fn test_compute_before_setup() {
        let shape = Shape::from([4]);
        let mut graph = Graph::new(1);
        let forward = graph
            .push("relu", Box::new(Relu::new(ReluConf::new())), vec![shape], vec![], None)
            .expect("push");
        let model = Model::new();

        // no graph.setup
        let batch = Batch::new(DataBuffer::zeros(16));
        let result = graph.compute(forward, &batch, &model, 0);
        assert!(matches!(
            result,
            Err(crate::graph::GraphError::Kernel(KernelError::Setup(_)))
        ));
    }

    #[test]
    fn test_concurrent_batches_stay_isolated() {
        use rayon::prelude::*;

        const BATCHES: usize = 8;

        let conf = ReluConf::new().with_negative_slope(0.1);
        let (mut graph, forward, inject, backward) = gradient_graph(conf, vec![3.0; 16], BATCHES);
        let model = Model::new();
        graph.setup(&model).expect("setup");

        (0..BATCHES).into_par_iter().for_each(|slot| {
            let mut rng = fastrand::Rng::with_seed(slot as u64);
            let values = (0..16).map(|_| rng.f32() * 2.0 - 1.0).collect_vec();

            let batch = Batch::new(DataBuffer::create::<f32>(&values));
            graph.compute(forward, &batch, &model, slot).expect("forward");
            graph.compute(inject, &batch, &model, slot).expect("inject");
            graph.compute(backward, &batch, &model, slot).expect("backward");

            let output = batch.output_of(backward).expect("output");
            for (value, x) in output.to_vec::<f32>().iter().zip_eq(values) {
                let reference = if x > 0.0 { 3.0 } else { 0.3 };
                assert!((value - reference).abs() < 1e-6, "{value} != {reference}");
            }
        });
    }
}
