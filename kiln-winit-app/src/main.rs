mod app;
mod platform;

use kiln_crate_tools::init_log::init_log;
use kiln_crate_tools::resource::KilnPath;
use kiln_gfx::fatal::{fatal_message, set_fatal_hook};
use kiln_render_interface::config::BackendConfig;
use winit::event_loop::EventLoop;

use crate::app::KilnApp;

fn main() -> anyhow::Result<()> {
    init_log();
    tracy_client::Client::start();
    set_fatal_hook(|err| log::error!("{}", fatal_message(err)));

    let config = BackendConfig::load_or_default(KilnPath::config_path("kiln.toml"));
    log::info!("config: {config:?}");

    let event_loop = EventLoop::new()?;
    let mut app = KilnApp::new(config);
    event_loop.run_app(&mut app)?;

    log::info!("end run.");
    app.destroy();
    Ok(())
}
