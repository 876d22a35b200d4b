use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod app;
mod scoring;
mod settings;

fn main() -> eframe::Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("CCM scoring starting up");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 800.0])
            .with_title("CCM Scoring"),
        ..Default::default()
    };

    eframe::run_native(
        "CCM Scoring",
        options,
        Box::new(|cc| Ok(Box::new(app::ScoringApp::new(cc)))),
    )
}
