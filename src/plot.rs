//! Plotting utilities for training runs

use std::error::Error;

use plotters::{
    chart::ChartBuilder,
    prelude::{BitMapBackend, IntoDrawingArea},
    series::LineSeries,
    style::{BLUE, WHITE},
};

/// Plots the per-epoch average loss as a line chart
pub fn plot_loss_curve(losses: &[f32], file_name: &str) -> Result<(), Box<dyn Error>> {
    if losses.is_empty() {
        log::warn!("No losses recorded, skipping loss curve");
        return Ok(());
    }

    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let max_loss = losses.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut chart = ChartBuilder::on(&root_area)
        .caption("Training loss", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0f32..losses.len() as f32, 0.0f32..max_loss * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc("average loss")
        .draw()?;

    chart.draw_series(LineSeries::new(
        losses
            .iter()
            .enumerate()
            .map(|(epoch, &loss)| ((epoch + 1) as f32, loss)),
        &BLUE,
    ))?;

    root_area.present()?;
    log::info!("Loss curve has been saved to '{}'.", file_name);

    Ok(())
}
