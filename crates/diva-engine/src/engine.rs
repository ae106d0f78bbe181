//! Entry point tying request matching, caching, queueing, execution and
//! result handling together.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info_span, Instrument};

use crate::backend::{Backends, BackendKind, Completion, ExecutorKind};
use crate::config::EngineConfig;
use crate::error::{ExecutionError, ParameterError, ResultError, Result};
use crate::params::{
    expand_data_wildcards, match_order, match_params, match_process_data, ParamCache,
    ReservedContext,
};
use crate::process::{
    output_collection_name, Collection, CollectionResponse, DataElement, ExecutionRequest,
    ExecutionType, Process, ProcessStatus,
};
use crate::queue::{Dispatcher, Queues};
use crate::result::validate_result;
use crate::services::{AlgorithmDescriptor, ServiceState, ServicesRegistry};
use crate::statistics::Statistics;
use crate::storage::{filesystem, StorageLayout};

pub struct Engine {
    config: EngineConfig,
    layout: StorageLayout,
    cache: ParamCache,
    services: Arc<ServicesRegistry>,
    statistics: Arc<Statistics>,
    queues: Arc<Queues>,
    dispatcher: Dispatcher,
    backends: Backends,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let backends = Backends::from_config(&config);
        Self::with_backends(config, backends)
    }

    pub fn with_backends(config: EngineConfig, backends: Backends) -> Arc<Self> {
        let layout = StorageLayout::new(&config);
        let services = Arc::new(ServicesRegistry::new(config.paths.services_info_file.clone()));
        let statistics = Arc::new(Statistics::new(Arc::clone(&services), layout.clone()));
        let queues = Arc::new(Queues::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&queues),
            Arc::clone(&statistics),
            config.local.max_concurrent,
        );

        Arc::new(Self {
            cache: ParamCache::new(config.paths.cache_path.clone()),
            layout,
            services,
            statistics,
            queues,
            dispatcher,
            backends,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn cache(&self) -> &ParamCache {
        &self.cache
    }

    pub fn services(&self) -> &ServicesRegistry {
        &self.services
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    /// Matches `request` against the algorithm at `request_path`, answers cached
    /// processes immediately and queues the rest.
    ///
    /// Every process of the collection is matched before any is queued, so a
    /// parameter error leaves nothing behind.
    pub async fn submit(
        self: &Arc<Self>,
        request_path: &str,
        request: ExecutionRequest,
        execution_type: ExecutionType,
    ) -> Result<CollectionResponse> {
        let descriptor = self.services.info_by_path(request_path).await?;
        let mut collection = Collection::new(
            &descriptor.service,
            request_path,
            &request,
            execution_type,
            &self.layout,
        );
        log::info!(
            "New {:?} request for {} as collection {}",
            execution_type,
            request_path,
            collection.name
        );

        filesystem::ensure_directory(&collection.output_folder)?;
        let processes = match self.prepare(&mut collection, &descriptor, &request) {
            Ok(processes) => processes,
            Err(e) => {
                if let Err(cleanup) = filesystem::remove_dir_if_exists(&collection.output_folder) {
                    log::warn!("{}", cleanup);
                }
                return Err(e);
            }
        };

        self.queue_collection(&mut collection, processes).await
    }

    /// Reserves output for every process, writes the collection response and
    /// only then queues the uncached ones. A failure part way leaves nothing
    /// queued and drops what was reserved.
    async fn queue_collection(
        self: &Arc<Self>,
        collection: &mut Collection,
        processes: Vec<Process>,
    ) -> Result<CollectionResponse> {
        let reserved = self.reserve(collection, processes).await.and_then(|queued| {
            let response = collection.response(&self.layout);
            filesystem::write_json(&collection.result_file, &response)?;
            Ok((queued, response))
        });
        let (queued, response) = match reserved {
            Ok(reserved) => reserved,
            Err(e) => {
                self.abandon(collection).await;
                return Err(e);
            }
        };

        let mut kinds = BTreeSet::new();
        for process in queued {
            kinds.insert(process.backend);
            self.queues.get(process.backend).enqueue(process);
        }
        for kind in kinds {
            self.dispatch(kind);
        }
        Ok(response)
    }

    /// Binds cache hits and reserves output for the rest, which are returned
    /// for queueing.
    async fn reserve(&self, collection: &mut Collection, processes: Vec<Process>) -> Result<Vec<Process>> {
        let mut queued = Vec::new();
        for mut process in processes {
            if !process.is_test() && self.cache.load_param_info(&mut process, &self.layout).await? {
                collection.processes.push(process);
                continue;
            }

            process.reserve_output(&self.layout)?;
            self.cache.save_param_info(&process).await?;
            process.status = ProcessStatus::Queued;
            collection.processes.push(process.clone());
            queued.push(process);
        }
        Ok(queued)
    }

    async fn abandon(&self, collection: &Collection) {
        log::warn!("Abandoning collection {}", collection.name);
        for process in collection
            .processes
            .iter()
            .filter(|p| p.status == ProcessStatus::Queued)
        {
            if let Err(e) = self.cache.remove_param_info(process).await {
                log::warn!("{}", e);
            }
        }
        for removed in [
            filesystem::remove_dir_if_exists(&collection.output_folder),
            filesystem::remove_file_if_exists(&collection.result_file),
        ] {
            if let Err(e) = removed {
                log::warn!("{}", e);
            }
        }
    }

    fn prepare(
        &self,
        collection: &mut Collection,
        descriptor: &AlgorithmDescriptor,
        request: &ExecutionRequest,
    ) -> Result<Vec<Process>> {
        if request.data.is_empty() && !descriptor.data.is_empty() {
            return Err(ParameterError::NoData.into());
        }

        let ctx = ReservedContext::new(&self.config, &collection.output_folder);
        collection.parameters = match_params(&descriptor.parameters, request, &ctx)?;

        if collection.execution_type == ExecutionType::Regular {
            if let Some(input) = request.input_collection_name() {
                collection.output_collection =
                    output_collection_name(&input, &descriptor.service, Utc::now());
            }
        }

        let mut elements = expand_data_wildcards(request.data.clone(), &self.layout)?;
        if elements.is_empty() {
            elements.push(DataElement::new());
        }

        let now = Utc::now();
        let mut processes = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            let mut process = Process::new(collection, descriptor, index, element.clone(), &self.layout, now);
            match_process_data(&mut process, &element, &descriptor.data, &self.layout)?;
            match_order(&mut process, &descriptor.param_order)?;
            processes.push(process);
        }
        Ok(processes)
    }

    /// Starts every queued process of `kind` the dispatcher admits.
    pub fn dispatch(self: &Arc<Self>, kind: BackendKind) {
        for process in self.dispatcher.admit(kind) {
            let engine = Arc::clone(self);
            let span = info_span!(
                "execute",
                backend = %kind,
                collection = %process.root_folder,
                folder = %process.method_folder
            );
            tokio::spawn(async move { engine.run(process).await }.instrument(span));
        }
    }

    async fn run(self: Arc<Self>, process: Arc<Process>) {
        let token = process.token().unwrap_or_default().to_string();
        let executor = ExecutorKind::for_backend(process.backend, self.config.server.cwl_support);

        let outcome = match self.backends.resolve(executor) {
            Ok(backend) => backend.execute(&process).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Completion::Finished(output)) => {
                let handled = process.result_handler.handle_result(
                    &output.stdout,
                    &output.stderr,
                    &process,
                    &self.layout,
                );
                self.finish(&token, &process, handled).await;
            }
            Ok(Completion::Workflow) => {
                let handled = process.result_handler.handle_cwl_result(&process, &self.layout);
                self.finish(&token, &process, handled).await;
            }
            Ok(Completion::Detached) => {
                log::debug!("{} is waiting for its callback", token);
            }
            Err(e) => {
                let cwl = matches!(e, ExecutionError::CwlFailed { .. });
                self.fail(&token, &process, &e.to_string(), cwl).await;
            }
        }

        self.dispatch(process.backend);
    }

    async fn finish(
        &self,
        token: &str,
        process: &Process,
        handled: std::result::Result<Option<Value>, ResultError>,
    ) {
        match handled {
            Ok(document) => {
                match self.statistics.end_recording(token).await {
                    Ok(Some(settled)) => log::info!(
                        "{}/{} {:?} after {:.3}s",
                        process.root_folder,
                        process.method_folder,
                        settled.process.status,
                        settled.elapsed
                    ),
                    Ok(None) => {}
                    Err(e) => log::error!("Failed to record statistics for {}: {}", token, e),
                }
                if process.is_test() {
                    self.finalize_test(process, document.as_ref()).await;
                }
            }
            Err(e) => self.fail(token, process, &e.to_string(), false).await,
        }
    }

    async fn fail(&self, token: &str, process: &Process, message: &str, cwl: bool) {
        let Some(settled) = self.statistics.remove_active_execution(token) else {
            log::warn!("Ignoring failure of finished execution {}: {}", token, message);
            return;
        };
        log::info!(
            "{}/{} {:?} after {:.3}s",
            process.root_folder,
            process.method_folder,
            settled.process.status,
            settled.elapsed
        );

        match self
            .services
            .record_exception(&process.algorithm_identifier, message)
            .await
        {
            Ok(true) => {}
            Ok(false) => log::warn!("No algorithm {} to record exception on", process.algorithm_identifier),
            Err(e) => log::error!("Failed to record exception: {}", e),
        }

        let handled = if cwl {
            process.result_handler.handle_cwl_error(process)
        } else {
            process.result_handler.handle_error(message, process)
        };
        if let Err(e) = handled {
            log::error!("Failed to write error document for {}: {}", token, e);
        }

        if process.is_test() {
            self.set_status(process, ServiceState::Error(message.to_string()))
                .await;
            self.discard_output(process).await;
        }
    }

    /// Result POST of a detached job.
    pub async fn complete_job(self: &Arc<Self>, token: &str, body: &Value) -> Result<bool> {
        let Some(process) = self.statistics.get_process(token) else {
            log::warn!("Result callback for unknown job {}", token);
            return Ok(false);
        };

        filesystem::write_json(&process.tmp_result_file, body)?;
        let handled = process
            .result_handler
            .handle_result("", "", &process, &self.layout);
        self.finish(token, &process, handled).await;

        self.clean_up(&process).await;
        self.dispatch(process.backend);
        Ok(true)
    }

    /// Error POST of a detached job.
    pub async fn fail_job(self: &Arc<Self>, token: &str, message: &str) -> Result<bool> {
        let Some(process) = self.statistics.get_process(token) else {
            log::warn!("Error callback for unknown job {}", token);
            return Ok(false);
        };

        self.fail(token, &process, message, false).await;

        self.clean_up(&process).await;
        self.dispatch(process.backend);
        Ok(true)
    }

    async fn clean_up(&self, process: &Process) {
        let executor = ExecutorKind::for_backend(process.backend, self.config.server.cwl_support);
        let result = match self.backends.resolve(executor) {
            Ok(backend) => backend.clean_up(process).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Clean-up failed for {}/{}: {}", process.root_folder, process.method_folder, e);
        }
    }

    /// Test runs check the produced document, record the algorithm status and
    /// leave no result behind.
    async fn finalize_test(&self, process: &Process, document: Option<&Value>) {
        let state = match document.map(validate_result) {
            Some(Err(e)) => {
                log::warn!("Test run of {} produced an invalid result: {}", process.request_path, e);
                ServiceState::Error(e.to_string())
            }
            _ => ServiceState::Ok,
        };
        self.set_status(process, state).await;
        self.discard_output(process).await;
    }

    async fn set_status(&self, process: &Process, state: ServiceState) {
        if let Err(e) = self.services.update_status(&process.request_path, state).await {
            log::error!("Failed to update status of {}: {}", process.request_path, e);
        }
    }

    async fn discard_output(&self, process: &Process) {
        if let Err(e) = self.cache.remove_param_info(process).await {
            log::warn!("{}", e);
        }
        if let Err(e) = filesystem::remove_dir_if_exists(&process.output_folder) {
            log::warn!("{}", e);
        }
    }
}
