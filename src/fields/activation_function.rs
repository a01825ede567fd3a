//! Unary activation functions used by `field_activation_func` fields.

/// Inputs beyond this magnitude are clamped before `exp` in the sigmoid.
const SIGMOID_CLAMP: f64 = 500.0;

pub const DEFAULT_LEAKY_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationFunction {
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu { alpha: f64 },
    Linear,
}

impl ActivationFunction {
    pub fn leaky_relu() -> Self {
        ActivationFunction::LeakyRelu {
            alpha: DEFAULT_LEAKY_ALPHA,
        }
    }

    pub fn f(self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Relu => x.max(0.0),
            ActivationFunction::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            ActivationFunction::Linear => x,
        }
    }

    /// Derivative of the function at `x`.
    pub fn outer_grad(self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::LeakyRelu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            ActivationFunction::Linear => 1.0,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    let x = x.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
    1.0 / (1.0 + (-x).exp())
}
