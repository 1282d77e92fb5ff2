//! Incremental gradient update rules for backprop
//!
//! Each derived node records the operation which created it. During the backward
//! pass the rule for that operation propagates the node's accumulated gradient
//! into its operands.

use crate::values::Value;

/// Operation which created a derived node in the computation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Pow,
    Exp,
    Ln,
    ReLU,
    Sigmoid,
}

impl Op {
    pub fn n_operands(&self) -> usize {
        match self {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => 2,
            Op::Neg | Op::Exp | Op::Ln | Op::ReLU | Op::Sigmoid => 1,
        }
    }

    /// Propagates the gradient of `out` into the operands it was derived from
    pub(crate) fn apply(&self, out: &Value) {
        let (out_grad, out_data, children) = {
            let inner = out.0.borrow();
            (inner.grad, inner.data, inner.children.clone())
        };
        debug_assert_eq!(children.len(), self.n_operands());
        match self {
            // out = in1 + in2
            Op::Add => {
                children[0].borrow_mut().grad += out_grad;
                children[1].borrow_mut().grad += out_grad;
            }
            // out = in1 - in2
            Op::Sub => {
                children[0].borrow_mut().grad += out_grad;
                children[1].borrow_mut().grad += -out_grad;
            }
            // out = in1 * in2
            Op::Mul => {
                let (in1, in2) = (children[0].borrow().data, children[1].borrow().data);
                children[0].borrow_mut().grad += in2 * out_grad;
                children[1].borrow_mut().grad += in1 * out_grad;
            }
            // out = in1 / in2
            Op::Div => {
                let (in1, in2) = (children[0].borrow().data, children[1].borrow().data);
                children[0].borrow_mut().grad += out_grad / in2;
                children[1].borrow_mut().grad += -in1 * out_grad / in2.powf(2.0);
            }
            // out = -in
            Op::Neg => {
                children[0].borrow_mut().grad += -out_grad;
            }
            // out = in1^in2
            // da^b/db is only defined for positive a, so the exponent operand
            // receives no gradient
            Op::Pow => {
                let (base, exponent) = (children[0].borrow().data, children[1].borrow().data);
                children[0].borrow_mut().grad += exponent * base.powf(exponent - 1.0) * out_grad;
            }
            // out = exp(in)
            Op::Exp => {
                children[0].borrow_mut().grad += out_data * out_grad;
            }
            // out = ln(in)
            Op::Ln => {
                let in1 = children[0].borrow().data;
                children[0].borrow_mut().grad += out_grad / in1;
            }
            // out = max(in, 0)
            Op::ReLU => {
                let in1 = children[0].borrow().data;
                children[0].borrow_mut().grad += if in1 > 0.0 { out_grad } else { 0.0 };
            }
            // out = 1 / (1 + exp(-in))
            Op::Sigmoid => {
                children[0].borrow_mut().grad += out_data * (1.0 - out_data) * out_grad;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_operands() {
        assert_eq!(Op::Add.n_operands(), 2);
        assert_eq!(Op::Pow.n_operands(), 2);
        assert_eq!(Op::Sigmoid.n_operands(), 1);
        assert_eq!(Op::Ln.n_operands(), 1);
    }

    #[test]
    fn test_repeated_operand_accumulates() {
        // out = a * a, da should accumulate from both operand slots
        let a = Value::new(3.0);
        let out = &a * &a;
        out.backward();

        // d(a^2)/da = 2a
        assert_eq!(a.grad(), 6.0);
    }
}
