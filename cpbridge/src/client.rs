//! Session manager: one connection, one session, one request at a time.

use crate::bridge::{Envelope, Exchange, SessionId, Transport, ZmqTransport, check_reply};
use crate::config::ClientConfig;
use crate::error::{BridgeError, Result};
use crate::exchange::{CleanFlags, ImageSet, PipelineInfo, clean, connect, pipeline_info, run};
use crate::features::FeatureDescriptor;
use crate::measurements::MeasurementBundle;

/// Client for a single bridge worker session.
///
/// Every exchange takes `&mut self`, so at most one request is outstanding.
/// A transport fault (I/O error, peer gone, timeout) drops the connection;
/// later exchanges fail with [`BridgeError::NotConnected`] while cached
/// state stays readable.
pub struct BridgeClient {
    transport: Option<Box<dyn Transport>>,
    session: SessionId,
    config: ClientConfig,
    pipeline: Option<String>,
    info: Option<PipelineInfo>,
    measurements: Option<MeasurementBundle>,
}

impl BridgeClient {
    /// Connect to `tcp://host:port` (or `host:port`) and perform the handshake.
    pub async fn connect(address: &str, config: ClientConfig) -> Result<Self> {
        let transport = ZmqTransport::connect(address, &config).await?;
        let client = Self::with_transport(Box::new(transport), config).await?;
        tracing::info!(address, session = %client.session, "Connected to worker");
        Ok(client)
    }

    /// Perform the handshake over a caller-supplied transport.
    pub async fn with_transport(
        transport: Box<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self> {
        let mut client = Self {
            transport: Some(transport),
            session: SessionId::new(),
            config,
            pipeline: None,
            info: None,
            measurements: None,
        };
        let request = connect::request(&client.session);
        client.exchange(Exchange::Connect, request).await?;
        Ok(client)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Close the transport. Safe to call more than once.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            tracing::info!(session = %self.session, "Disconnecting from worker");
            transport.close().await?;
        }
        Ok(())
    }

    /// Upload a pipeline and cache what it needs and produces.
    ///
    /// On failure the previously loaded pipeline (if any) stays loaded.
    pub async fn load_pipeline(&mut self, pipeline: &str) -> Result<&PipelineInfo> {
        let request = pipeline_info::request(&self.session, pipeline);
        let reply = self.exchange(Exchange::PipelineInfo, request).await?;
        let info = pipeline_info::parse_reply(reply)?;
        tracing::debug!(
            channels = info.channels().len(),
            groups = info.groups().len(),
            "Loaded pipeline"
        );
        self.pipeline = Some(pipeline.to_string());
        Ok(&*self.info.insert(info))
    }

    pub fn pipeline(&self) -> Option<&str> {
        self.pipeline.as_deref()
    }

    pub fn pipeline_info(&self) -> Option<&PipelineInfo> {
        self.info.as_ref()
    }

    /// Channels of the loaded pipeline; empty before one is loaded.
    pub fn input_channels(&self) -> &[String] {
        self.info.as_ref().map(PipelineInfo::channels).unwrap_or_default()
    }

    pub fn result_groups(&self) -> &[String] {
        self.info.as_ref().map(PipelineInfo::groups).unwrap_or_default()
    }

    pub fn features(&self, group: Option<&str>) -> &[FeatureDescriptor] {
        self.info
            .as_ref()
            .map(|info| info.features(group))
            .unwrap_or_default()
    }

    pub fn sorted_features(&self) -> Vec<FeatureDescriptor> {
        self.info
            .as_ref()
            .map(PipelineInfo::sorted_features)
            .unwrap_or_default()
    }

    /// Run the loaded pipeline for one cycle.
    pub async fn run(&mut self, images: &ImageSet) -> Result<&MeasurementBundle> {
        self.run_exchange(Exchange::Run, images).await
    }

    /// Run the loaded pipeline over a group of cycles stacked on each
    /// tensor's leading axis.
    pub async fn run_group(&mut self, images: &ImageSet) -> Result<&MeasurementBundle> {
        self.run_exchange(Exchange::RunGroup, images).await
    }

    /// Measurements from the last successful run.
    pub fn measurements(&self) -> Option<&MeasurementBundle> {
        self.measurements.as_ref()
    }

    /// Ask the worker to strip the named modules from `pipeline`.
    ///
    /// An empty list returns the pipeline unchanged without a round trip.
    pub async fn clean(&mut self, pipeline: &str, modules: &[String]) -> Result<String> {
        if modules.is_empty() {
            return Ok(pipeline.to_string());
        }
        let request = clean::request(&self.session, pipeline, modules)?;
        let reply = self.exchange(Exchange::CleanPipeline, request).await?;
        clean::parse_reply(reply)
    }

    pub async fn clean_with_flags(&mut self, pipeline: &str, flags: CleanFlags) -> Result<String> {
        self.clean(pipeline, &flags.module_names()).await
    }

    /// Strip every module category a host cannot run.
    pub async fn clean_unsupported(&mut self, pipeline: &str) -> Result<String> {
        self.clean_with_flags(pipeline, CleanFlags::ALL).await
    }

    /// Clean the loaded pipeline, replacing it on success.
    pub async fn clean_loaded(&mut self, modules: &[String]) -> Result<&str> {
        let pipeline = self.pipeline.clone().ok_or(BridgeError::NoPipeline)?;
        let cleaned = self.clean(&pipeline, modules).await?;
        Ok(self.pipeline.insert(cleaned).as_str())
    }

    pub async fn clean_loaded_with_flags(&mut self, flags: CleanFlags) -> Result<&str> {
        self.clean_loaded(&flags.module_names()).await
    }

    pub async fn clean_loaded_unsupported(&mut self) -> Result<&str> {
        self.clean_loaded_with_flags(CleanFlags::ALL).await
    }

    async fn run_exchange(
        &mut self,
        exchange: Exchange,
        images: &ImageSet,
    ) -> Result<&MeasurementBundle> {
        let (Some(pipeline), Some(info)) = (&self.pipeline, &self.info) else {
            return Err(BridgeError::NoPipeline);
        };
        if let Some(missing) = info.channels().iter().find(|c| !images.contains_key(*c)) {
            return Err(BridgeError::MissingChannel(missing.clone()));
        }

        let request = run::request(&self.session, exchange, pipeline, images)?;
        let reply = self.exchange(exchange, request).await?;
        let bundle = run::parse_reply(reply)?;
        tracing::debug!(groups = bundle.groups().len(), "Run complete");
        Ok(&*self.measurements.insert(bundle))
    }

    /// Send a request and wait for its checked reply.
    async fn exchange(&mut self, exchange: Exchange, request: Envelope) -> Result<Envelope> {
        let result = self.round_trip(exchange, request).await;
        if let Err(err) = &result {
            if err.is_transport() && self.transport.take().is_some() {
                tracing::warn!(
                    session = %self.session,
                    request = exchange.request_name(),
                    error = %err,
                    "Dropping worker connection"
                );
            }
        }
        result
    }

    async fn round_trip(&mut self, exchange: Exchange, request: Envelope) -> Result<Envelope> {
        let transport = self.transport.as_mut().ok_or(BridgeError::NotConnected)?;

        tracing::debug!(
            request = exchange.request_name(),
            frames = request.remaining() + 2,
            payload_size_bytes = request.payload_size(),
            "Sending request"
        );
        transport.send(request.into_frames()).await?;

        let frames = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.recv())
                .await
                .map_err(|_| BridgeError::Timeout(limit))??,
            None => transport.recv().await?,
        };
        let reply = Envelope::from_frames(frames)?;
        tracing::debug!(
            reply = reply.name(),
            frames = reply.remaining() + 2,
            payload_size_bytes = reply.payload_size(),
            "Received reply"
        );
        check_reply(reply, exchange, &self.session)
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("session", &self.session)
            .field("connected", &self.is_connected())
            .field("pipeline_loaded", &self.pipeline.is_some())
            .finish()
    }
}
