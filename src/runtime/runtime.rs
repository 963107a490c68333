use super::fetcher::HostFetcher;
use super::handle::RuntimeHandle;
use crate::cell::{CellServices, CellViewModel};
use crate::config::{self, RuntimeConfig};
use crate::dimension::DimensionReporter;
use crate::errors::RuntimeError;
use crate::events::{EventBus, HostCommand, RuntimeEvent};
use crate::highlight::Highlighter;
use crate::input::InputCoordinator;
use crate::logging;
use crate::preload::PreloadManager;
use crate::renderer::{builtin, RendererRegistry, StaticModuleLoader};
use crate::resize::{ResizeSettings, ResizeTracker};
use crate::scheduler::OutputScheduler;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Whether the loop keeps going after a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct OutputRuntime {
    /// Configuration for the whole runtime.
    config: Arc<RuntimeConfig>,
    services: CellServices,
    view_model: CellViewModel,
    highlighter: Highlighter,
    input: InputCoordinator,
    fetcher: Arc<HostFetcher>,
    /// Command sender (cloned into handles).
    cmd_tx: mpsc::Sender<HostCommand>,
    /// Command receiver (owned by the run loop).
    cmd_rx: mpsc::Receiver<HostCommand>,
    /// Is the runtime running?
    running: bool,
}

impl std::fmt::Debug for OutputRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRuntime")
            .field("view_model", &self.view_model)
            .field("highlighter", &self.highlighter)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl OutputRuntime {
    /// Create a runtime whose renderer and preload modules come from `loader`.
    ///
    /// The built-in renderers are registered into `loader` and into the registry. Logging is
    /// set up at the configured level; a logger the host already installed is kept.
    ///
    /// ```no_run
    /// # use output_runtime::{OutputRuntime, RuntimeConfig};
    /// # use output_runtime::renderer::StaticModuleLoader;
    /// # async fn demo() -> Result<(), output_runtime::RuntimeError> {
    /// let runtime = OutputRuntime::new(RuntimeConfig::default(), StaticModuleLoader::new())?;
    /// let (handle, _join) = runtime.start()?;
    /// handle.shutdown().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: RuntimeConfig, loader: StaticModuleLoader) -> Result<Self, RuntimeError> {
        config::validate(&config)?;
        logging::init(config.log_level);
        let config = Arc::new(config);

        // Commands from the host, in order.
        let (cmd_tx, cmd_rx) = mpsc::channel::<HostCommand>(config.channel_capacity);
        // Events to every subscriber.
        let bus = EventBus::new(config.channel_capacity);

        let scheduler = OutputScheduler::new(config.idle_timeout());
        let preloads = PreloadManager::new(Arc::new(loader.clone()), config.workspace_trusted);
        let registry = RendererRegistry::new(
            Arc::new(loader.clone()),
            preloads.clone(),
            scheduler.clone(),
            bus.clone(),
            config.renderer_settings.clone(),
            config.workspace_trusted,
        );
        registry.set_debug_logging(config.renderer_debug_logging);
        builtin::register_builtins(&loader, &registry)?;

        let reporter = DimensionReporter::new(bus.clone());
        let tracker = ResizeTracker::new(reporter.clone(), bus.clone(), ResizeSettings::from_config(&config));
        let fetcher = Arc::new(HostFetcher::new(bus.clone()));

        let services = CellServices {
            registry,
            scheduler,
            preloads,
            reporter,
            tracker,
            bus: bus.clone(),
            config: config.clone(),
            fetcher: Some(fetcher.clone()),
        };

        Ok(Self {
            view_model: CellViewModel::new(services.clone()),
            highlighter: Highlighter::for_platform(&config.capabilities),
            input: InputCoordinator::new(bus, &config.notebook_options),
            fetcher,
            services,
            config,
            cmd_tx,
            cmd_rx,
            running: false,
        })
    }

    /// Subscribe before [`start`](Self::start) to also see `initialized`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.services.bus.subscribe()
    }

    /// Spawn the run loop and return the handle and its join handle.
    pub fn start(self) -> Result<(RuntimeHandle, JoinHandle<()>), RuntimeError> {
        if self.running {
            return Err(RuntimeError::AlreadyRunning);
        }

        let handle = RuntimeHandle::new(self.cmd_tx.clone(), self.services.bus.clone());
        let join_handle = tokio::spawn(self.run());

        Ok((handle, join_handle))
    }

    /// Run the command loop.
    ///
    /// Frames tick at the configured interval and drive the resize tracker, drag throttling
    /// and the dimension flush. Heights changed while handling a command are flushed right
    /// after it. After a command, an empty queue counts as idle for the scheduler. The loop
    /// ends on `shutdown` or when every handle is dropped.
    pub async fn run(mut self) {
        self.running = true;
        log::info!("Runtime: started with {} strategy", self.highlighter.strategy_name());
        self.services.bus.publish(RuntimeEvent::Initialized);

        let mut frames = tokio::time::interval(self.config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle_command(cmd) == Flow::Stop {
                        break;
                    }
                    self.services.reporter.flush_now();
                    if self.cmd_rx.is_empty() {
                        self.services.scheduler.notify_idle();
                    }
                }
                _ = frames.tick() => self.on_frame(),
            }
        }

        self.shutdown_impl();
    }

    fn on_frame(&mut self) {
        self.services.tracker.on_frame();
        self.input.on_frame();
        // heights reported by render tasks since the last flush go out with this frame
        self.services.reporter.flush_now();
    }

    fn handle_command(&mut self, cmd: HostCommand) -> Flow {
        let vm = &mut self.view_model;
        match cmd {
            // ****************************************
            // ** Markup cells
            HostCommand::InitializeMarkup { request_id, cells } => {
                let renders: Vec<JoinHandle<()>> = cells.iter().filter_map(|c| vm.ensure_markup_cell(c)).collect();
                let bus = self.services.bus.clone();
                tokio::spawn(async move {
                    join_all(renders).await;
                    bus.publish(RuntimeEvent::InitializedMarkup { request_id });
                });
            }
            HostCommand::CreateMarkupCell { cell } => {
                vm.create_markup_cell(&cell);
            }
            HostCommand::ShowMarkupCell {
                id,
                top,
                content,
                metadata,
            } => {
                vm.show_markup_cell(&id, top, content.as_deref(), metadata);
            }
            HostCommand::HideMarkupCells { ids } => vm.hide_markup_cells(&ids),
            HostCommand::UnhideMarkupCells { ids } => vm.unhide_markup_cells(&ids),
            HostCommand::DeleteMarkupCell { ids } => vm.delete_markup_cells(&ids),
            HostCommand::UpdateMarkupScrolls { markup_cells } => vm.update_markup_scrolls(&markup_cells),
            HostCommand::UpdateSelectedCells { selected_cell_ids } => vm.update_selected_cells(&selected_cell_ids),

            // ****************************************
            // ** Outputs
            HostCommand::RenderOutput(req) => {
                vm.render_output(req);
            }
            HostCommand::Clear => {
                log::debug!("Runtime: clearing all cells");
                vm.clear_all();
                self.highlighter.dispose();
                self.fetcher.cancel_all();
                self.input.blur();
            }
            HostCommand::ClearOutput {
                cell_id,
                output_id,
                renderer_id,
            } => vm.clear_output(&cell_id, &output_id, renderer_id.as_deref()),
            HostCommand::HideOutput { cell_id, output_id } => vm.hide_output(&cell_id, &output_id),
            HostCommand::ShowOutput {
                cell_id,
                output_id,
                cell_top,
                content,
                renderer_id,
            } => vm.show_output(&cell_id, &output_id, cell_top, content, renderer_id),
            HostCommand::AckDimension { updates } => vm.ack_dimension(&updates),
            HostCommand::ViewScroll { widgets, markup_cells } => {
                vm.view_scroll(&widgets);
                vm.update_markup_scrolls(&markup_cells);
            }
            HostCommand::Decorations {
                cell_id,
                added_class_names,
                removed_class_names,
            } => vm.decorations(&cell_id, &added_class_names, &removed_class_names),

            // ****************************************
            // ** Renderers and preloads
            HostCommand::Preload { resources } => {
                for resource in resources {
                    // failures are logged by the preload manager and surface as values to waiters
                    let load = self.services.preloads.load(&resource.uri);
                    tokio::spawn(async move {
                        let _ = load.await;
                    });
                }
            }
            HostCommand::UpdateRenderers { renderers } => self.services.registry.update_all(renderers),
            HostCommand::CustomRendererMessage { renderer_id, message } => {
                self.services.registry.post_message(&renderer_id, message);
            }
            HostCommand::ReturnOutputItem { request_id, output } => self.fetcher.resolve(request_id, output),

            // ****************************************
            // ** Focus and input
            HostCommand::FocusOutput {
                cell_or_output_id,
                alternate_id,
            } => {
                let target = vm
                    .focus_target(&cell_or_output_id)
                    .or_else(|| alternate_id.and_then(|id| vm.focus_target(&id)));
                match target {
                    Some(output_id) => self.input.focus(&output_id),
                    None => log::debug!("Runtime: nothing to focus for {cell_or_output_id}"),
                }
            }
            HostCommand::BlurOutput => self.input.blur(),
            HostCommand::Input { event } => self.input.handle(event, vm),

            // ****************************************
            // ** Presentation
            HostCommand::NotebookStyles { styles } => self.services.registry.set_styles(styles),
            HostCommand::NotebookOptions { options, render_options } => {
                self.input.update_options(&options);
                if let Some(settings) = render_options {
                    self.services.registry.update_settings(settings);
                }
            }

            // ****************************************
            // ** Find
            HostCommand::Find { query, options } => {
                let targets = vm.searchable(options.include_markup, options.include_output, &options.find_ids);
                let matches = self.highlighter.find(&query, &options, &targets);
                self.services.bus.publish(RuntimeEvent::DidFind { matches });
            }
            HostCommand::FindHighlightCurrent { index, owner_id } => {
                let offset = self.highlighter.highlight_current(&owner_id, index).unwrap_or_else(|| {
                    log::debug!("Find[{owner_id}]: no match {index} to highlight");
                    0.0
                });
                self.services.bus.publish(RuntimeEvent::DidFindHighlightCurrent { offset });
            }
            HostCommand::FindUnhighlightCurrent { index, owner_id } => {
                self.highlighter.unhighlight_current(&owner_id, index);
            }
            HostCommand::FindStop { owner_id } => self.highlighter.remove(&owner_id),

            // ****************************************
            // ** Runtime control
            HostCommand::EnableLogging { level } => logging::set_level(level),
            HostCommand::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Release everything and tell the host.
    fn shutdown_impl(&mut self) {
        log::info!("Runtime: shutting down");
        self.view_model.clear_all();
        self.highlighter.dispose();
        self.fetcher.cancel_all();
        self.services.reporter.flush_now();
        self.running = false;
        self.services.bus.publish(RuntimeEvent::RuntimeShutdown);
    }
}
