//! A minimal library for building and training feed-forward neural networks
//! on handwritten digit images, using a PyTorch-like API.

pub mod backprop_fns;
pub mod dataloader;
pub mod datasets;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod plot;
pub mod values;
