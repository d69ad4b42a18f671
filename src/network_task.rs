//! Network Task: one HTTP execution, from listener notification
//! through transport, decode, cache write, and callback fan-out.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::Cache;
use crate::coalescer::Mergeable;
use crate::delegate::MulticastDelegate;
use crate::descriptor::Requestable;
use crate::error::Error;
use crate::expiry::CachePolicy;
use crate::fingerprint::Fingerprint;
use crate::task::{QueueDef, TaskLifecycle, TaskOp};
use crate::transport::{Transport, TransportRequest};
use crate::url_builder;

/// Lifecycle events fanned out to a task's listeners, mirroring
/// `requestStarted`/`requestCompleted`/`requestFailed`.
pub enum LifecycleEvent {
    Started(Fingerprint),
    Completed(Fingerprint),
    Failed(Fingerprint, Arc<Error>),
}

type ResultCallback<R> = Arc<dyn Fn(Result<Arc<R>, Arc<Error>>) + Send + Sync>;
type DataCallback<R> = Arc<dyn Fn(&R) + Send + Sync>;

/// Everything a `NetworkTask` needs beyond the descriptor/params pair:
/// collaborators it calls out to but does not own.
pub struct NetworkTaskDeps {
    pub transport: Arc<dyn Transport>,
    pub cache: Arc<Cache>,
    pub request_timeout: std::time::Duration,
}

/// Concrete task executing one descriptor's request exactly once, fanning
/// its result out to every callback merged onto it before it finished.
pub struct NetworkTask<D: Requestable> {
    id: Fingerprint,
    queue: QueueDef,
    lifecycle: TaskLifecycle,
    descriptor: Arc<D>,
    params: D::Params,
    cache_policy: Option<CachePolicy>,
    deps: NetworkTaskDeps,
    result_callbacks: Mutex<Vec<ResultCallback<D::Response>>>,
    data_callbacks: Mutex<Vec<DataCallback<D::Response>>>,
    listeners: MulticastDelegate<LifecycleEvent>,
}

impl<D: Requestable> NetworkTask<D> {
    pub fn new(
        id: Fingerprint,
        descriptor: Arc<D>,
        params: D::Params,
        cache_policy: Option<CachePolicy>,
        deps: NetworkTaskDeps,
    ) -> Self {
        let queue = descriptor.queue();
        Self {
            id,
            queue,
            lifecycle: TaskLifecycle::new(crate::task::PriorityOrdinal::NORMAL),
            descriptor,
            params,
            cache_policy,
            deps,
            result_callbacks: Mutex::new(Vec::new()),
            data_callbacks: Mutex::new(Vec::new()),
            listeners: MulticastDelegate::new(),
        }
    }

    pub fn add_result_callback(&self, callback: impl Fn(Result<Arc<D::Response>, Arc<Error>>) + Send + Sync + 'static) {
        self.result_callbacks.lock().push(Arc::new(callback));
    }

    pub fn add_data_callback(&self, callback: impl Fn(&D::Response) + Send + Sync + 'static) {
        self.data_callbacks.lock().push(Arc::new(callback));
    }

    pub fn listeners(&self) -> &MulticastDelegate<LifecycleEvent> {
        &self.listeners
    }

    async fn execute(&self) -> Result<Arc<D::Response>, Error> {
        self.listeners.invoke(&LifecycleEvent::Started(self.id.clone()));

        let query = self.descriptor.as_query(&self.params);
        let body = self.descriptor.as_body(&self.params);
        let headers = self.descriptor.headers(&self.params).unwrap_or_default();
        let host = self.descriptor.host(&self.params);
        let port = self.descriptor.port(&self.params);
        let path = self.descriptor.path(&self.params);

        let url = url_builder::compose(D::SCHEME, &host, port, &path, query.as_ref())?;

        let request = TransportRequest {
            method: D::METHOD,
            url,
            headers,
            body,
            timeout: self.deps.request_timeout,
        };

        let response = self.deps.transport.send(request).await?;

        if let Some(err) = self.descriptor.handle(&response.parts, &response.body) {
            return Err(err);
        }

        let decoded = self.descriptor.decode(&response.body)?;

        if let Some(policy) = self.cache_policy {
            self.deps.cache.put(&self.id, response.body.into(), policy).await;
        }

        Ok(Arc::new(decoded))
    }

    /// Runs the task and fans the outcome out to every merged callback, in
    /// the order the design specifies: result callbacks, then
    /// `requestCompleted`/`requestFailed`, then data callbacks.
    async fn run_and_dispatch(self: Arc<Self>) {
        match self.execute().await {
            Ok(value) => {
                for callback in self.result_callbacks.lock().iter() {
                    callback(Ok(value.clone()));
                }
                self.listeners.invoke(&LifecycleEvent::Completed(self.id.clone()));
                for callback in self.data_callbacks.lock().iter() {
                    callback(&value);
                }
            }
            Err(err) => {
                let err = Arc::new(err);
                for callback in self.result_callbacks.lock().iter() {
                    callback(Err(err.clone()));
                }
                self.listeners.invoke(&LifecycleEvent::Failed(self.id.clone(), err));
            }
        }
        self.lifecycle.finish();
    }
}

#[async_trait::async_trait]
impl<D: Requestable> TaskOp for NetworkTask<D> {
    fn id(&self) -> &Fingerprint {
        &self.id
    }

    fn queue(&self) -> &QueueDef {
        &self.queue
    }

    fn lifecycle(&self) -> &TaskLifecycle {
        &self.lifecycle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn run(self: Arc<Self>) {
        self.run_and_dispatch().await;
    }
}

impl<D: Requestable> Mergeable for NetworkTask<D> {
    fn merge_from(&self, other: &Self) {
        self.result_callbacks.lock().extend(other.result_callbacks.lock().drain(..));
        self.data_callbacks.lock().extend(other.data_callbacks.lock().drain(..));
        self.listeners.merge_from(&other.listeners);
    }
}
