use super::{ComputeContext, Kernel, KernelError, MemoryRequirements, SetupContext};
use crate::graph::shape::Shape;

/// Local response normalization configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrnConf {
    size: usize,
    alpha: f32,
    beta: f32,
    k: f32,
}

impl Default for LrnConf {
    fn default() -> Self {
        Self {
            size: 5,
            alpha: 1e-4,
            beta: 0.75,
            k: 1.0,
        }
    }
}

impl LrnConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_k(mut self, k: f32) -> Self {
        self.k = k;
        self
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    #[inline]
    pub fn beta(&self) -> f32 {
        self.beta
    }

    #[inline]
    pub fn k(&self) -> f32 {
        self.k
    }
}

/// Placeholder for the local response normalization gradient.
///
/// The gradient runs entirely on the accelerator side; there is no host
/// implementation. `compute` registers no batch output, so downstream
/// consumers must not expect one. With the `strict` feature enabled the
/// call errors instead of skipping.
#[derive(Debug)]
pub struct LrnGradient {
    #[allow(unused)]
    conf: LrnConf,
}

impl LrnGradient {
    pub fn new(conf: LrnConf) -> Self {
        Self { conf }
    }
}

impl Kernel for LrnGradient {
    fn name(&self) -> &'static str {
        "LrnGradient"
    }

    fn setup(&mut self, _ctx: SetupContext) -> Result<(), KernelError> {
        Ok(())
    }

    #[cfg(feature = "strict")]
    fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError> {
        Err(KernelError::Unsupported(ctx.name().into()))
    }

    #[cfg(not(feature = "strict"))]
    fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError> {
        log::debug!("kernel for operator {} is a no-op", ctx.name());
        Ok(())
    }

    fn memory_requirements(&self) -> MemoryRequirements {
        MemoryRequirements::default()
    }

    fn output_shape(&self) -> Option<&Shape> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{LrnConf, LrnGradient};
    use crate::{
        graph::{batch::Batch, buffer::DataBuffer, model::Model, operator::Graph, shape::Shape},
        kernel::Kernel,
    };

    #[test]
    fn test_conf_defaults() {
        let conf = LrnConf::new();
        assert_eq!(conf.size(), 5);
        assert_eq!(conf.k(), 1.0);

        let conf = conf.with_size(3).with_alpha(2e-4).with_beta(0.5).with_k(2.0);
        assert_eq!((conf.size(), conf.alpha(), conf.beta(), conf.k()), (3, 2e-4, 0.5, 2.0));
    }

    #[test]
    fn test_requirements_are_zero() {
        let kernel = LrnGradient::new(LrnConf::new());
        assert_eq!(kernel.memory_requirements().output(), 0);
        assert!(kernel.output_shape().is_none());
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn test_compute_registers_no_output() {
        let mut graph = Graph::new(1);
        let id = graph
            .push(
                "lrn-gradient",
                Box::new(LrnGradient::new(LrnConf::new())),
                vec![Shape::from([4])],
                vec![],
                None,
            )
            .expect("push");
        let model = Model::new();
        graph.setup(&model).expect("setup");

        let batch = Batch::new(DataBuffer::zeros(16));
        graph.compute(id, &batch, &model, 0).expect("compute");
        assert!(batch.output_of(id).is_none());
        assert!(batch.is_empty());
    }

    #[cfg(feature = "strict")]
    #[test]
    fn test_compute_errors_in_strict_mode() {
        use crate::{graph::GraphError, kernel::KernelError};

        let mut graph = Graph::new(1);
        let id = graph
            .push(
                "lrn-gradient",
                Box::new(LrnGradient::new(LrnConf::new())),
                vec![Shape::from([4])],
                vec![],
                None,
            )
            .expect("push");
        let model = Model::new();
        graph.setup(&model).expect("setup");

        let batch = Batch::new(DataBuffer::zeros(16));
        let result = graph.compute(id, &batch, &model, 0);
        assert!(matches!(
            result,
            Err(GraphError::Kernel(KernelError::Unsupported(_)))
        ));
    }
}
