//! gRPC services over the query engine.
//!
//! Two services share one [`GraphEngine`]: `GraphEngine` answers the
//! per-request queries and `GraphSampler` manages the process-wide sampler
//! registry. Engine work is synchronous by design (memory-mapped reads plus
//! the engine's own fan-out pool), so every handler moves it onto the
//! blocking pool and keeps the transport threads free.

use graphd_core::{FeatureMeta, RequestError, SamplerCategory};
use graphd_storage::{GraphEngine, SamplerRegistry};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Generated protobuf types for the graphd wire protocol.
pub mod proto {
    tonic::include_proto!("graphd");
}

use proto::create_sampler_request::Category;
use proto::graph_engine_server::GraphEngine as GraphEngineRpc;
use proto::graph_sampler_server::GraphSampler as GraphSamplerRpc;
use proto::*;

/// Maps structural request violations onto transport status codes.
fn request_error_status(err: RequestError) -> Status {
    match err {
        RequestError::UnknownSampler(_) => Status::not_found(err.to_string()),
        _ => Status::invalid_argument(err.to_string()),
    }
}

/// Runs engine work on the blocking pool.
async fn run_blocking<T, F>(task: F) -> Result<T, Status>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Status::internal(format!("engine worker failed: {e}")))
}

// =============================================================================
// Graph engine service
// =============================================================================

/// The read-only query service.
#[derive(Debug, Clone)]
pub struct GraphEngineService {
    engine: Arc<GraphEngine>,
}

impl GraphEngineService {
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl GraphEngineRpc for GraphEngineService {
    async fn get_node_types(
        &self,
        request: Request<NodeTypesRequest>,
    ) -> Result<Response<NodeTypesReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || engine.node_types(&req.node_ids)).await?;
        Ok(Response::new(NodeTypesReply {
            types: reply.types,
            offsets: reply.offsets,
        }))
    }

    async fn get_node_features(
        &self,
        request: Request<NodeFeaturesRequest>,
    ) -> Result<Response<NodeFeaturesReply>, Status> {
        let req = request.into_inner();
        let features: Vec<FeatureMeta> = req
            .features
            .iter()
            .map(|f| FeatureMeta::new(f.id, f.size))
            .collect();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || engine.node_features(req.node_ids, features)).await?;
        Ok(Response::new(NodeFeaturesReply {
            feature_values: reply.values,
            offsets: reply.offsets,
        }))
    }

    async fn get_edge_features(
        &self,
        request: Request<EdgeFeaturesRequest>,
    ) -> Result<Response<EdgeFeaturesReply>, Status> {
        let req = request.into_inner();
        let features: Vec<FeatureMeta> = req
            .features
            .iter()
            .map(|f| FeatureMeta::new(f.id, f.size))
            .collect();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || engine.edge_features(req.node_ids, req.types, features))
            .await?
            .map_err(request_error_status)?;
        Ok(Response::new(EdgeFeaturesReply {
            feature_values: reply.values,
            offsets: reply.offsets,
        }))
    }

    async fn get_node_sparse_features(
        &self,
        request: Request<NodeSparseFeaturesRequest>,
    ) -> Result<Response<SparseFeaturesReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply =
            run_blocking(move || engine.node_sparse_features(req.node_ids, req.feature_ids))
                .await?;
        Ok(Response::new(sparse_reply(reply)))
    }

    async fn get_edge_sparse_features(
        &self,
        request: Request<EdgeSparseFeaturesRequest>,
    ) -> Result<Response<SparseFeaturesReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || {
            engine.edge_sparse_features(req.node_ids, req.types, req.feature_ids)
        })
        .await?
        .map_err(request_error_status)?;
        Ok(Response::new(sparse_reply(reply)))
    }

    async fn get_node_string_features(
        &self,
        request: Request<NodeSparseFeaturesRequest>,
    ) -> Result<Response<StringFeaturesReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply =
            run_blocking(move || engine.node_string_features(req.node_ids, req.feature_ids))
                .await?;
        Ok(Response::new(StringFeaturesReply {
            values: reply.values,
            dimensions: reply.dimensions,
        }))
    }

    async fn get_edge_string_features(
        &self,
        request: Request<EdgeSparseFeaturesRequest>,
    ) -> Result<Response<StringFeaturesReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || {
            engine.edge_string_features(req.node_ids, req.types, req.feature_ids)
        })
        .await?
        .map_err(request_error_status)?;
        Ok(Response::new(StringFeaturesReply {
            values: reply.values,
            dimensions: reply.dimensions,
        }))
    }

    async fn get_neighbor_counts(
        &self,
        request: Request<GetNeighborsRequest>,
    ) -> Result<Response<GetNeighborCountsReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let counts = run_blocking(move || engine.neighbor_counts(&req.node_ids, &req.edge_types))
            .await?
            .map_err(request_error_status)?;
        Ok(Response::new(GetNeighborCountsReply {
            neighbor_counts: counts,
        }))
    }

    async fn get_neighbors(
        &self,
        request: Request<GetNeighborsRequest>,
    ) -> Result<Response<GetNeighborsReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || engine.full_neighbors(&req.node_ids, &req.edge_types))
            .await?
            .map_err(request_error_status)?;
        Ok(Response::new(GetNeighborsReply {
            node_ids: reply.node_ids,
            edge_weights: reply.edge_weights,
            edge_types: reply.edge_types,
            neighbor_counts: reply.neighbor_counts,
        }))
    }

    async fn weighted_sample_neighbors(
        &self,
        request: Request<WeightedSampleNeighborsRequest>,
    ) -> Result<Response<WeightedSampleNeighborsReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || {
            engine.weighted_sample_neighbors(&graphd_storage::WeightedSampleRequest {
                seed: req.seed,
                node_ids: req.node_ids,
                edge_types: req.edge_types,
                count: req.count as usize,
                default_node_id: req.default_node_id,
                default_node_weight: req.default_node_weight,
                default_edge_type: req.default_edge_type,
            })
        })
        .await?
        .map_err(request_error_status)?;
        Ok(Response::new(WeightedSampleNeighborsReply {
            neighbor_ids: reply.neighbor_ids,
            neighbor_weights: reply.neighbor_weights,
            neighbor_types: reply.neighbor_types,
            node_ids: reply.node_ids,
            shard_weights: reply.shard_weights,
        }))
    }

    async fn uniform_sample_neighbors(
        &self,
        request: Request<UniformSampleNeighborsRequest>,
    ) -> Result<Response<UniformSampleNeighborsReply>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let reply = run_blocking(move || {
            engine.uniform_sample_neighbors(&graphd_storage::UniformSampleRequest {
                seed: req.seed,
                node_ids: req.node_ids,
                edge_types: req.edge_types,
                count: req.count as usize,
                without_replacement: req.without_replacement,
                default_node_id: req.default_node_id,
                default_edge_type: req.default_edge_type,
            })
        })
        .await?
        .map_err(request_error_status)?;
        Ok(Response::new(UniformSampleNeighborsReply {
            neighbor_ids: reply.neighbor_ids,
            neighbor_types: reply.neighbor_types,
            shard_counts: reply.shard_counts,
            node_ids: reply.node_ids,
        }))
    }

    async fn get_metadata(
        &self,
        _request: Request<EmptyMessage>,
    ) -> Result<Response<MetadataReply>, Status> {
        let metadata = self.engine.metadata();
        Ok(Response::new(MetadataReply {
            nodes: metadata.node_count,
            edges: metadata.edge_count,
            node_types: metadata.node_type_count as u32,
            edge_types: metadata.edge_type_count as u32,
            node_features: metadata.node_feature_count as u32,
            edge_features: metadata.edge_feature_count as u32,
            partitions: metadata.partition_count as u32,
            node_partition_weights: metadata
                .node_partition_weights
                .iter()
                .flatten()
                .copied()
                .collect(),
            edge_partition_weights: metadata
                .edge_partition_weights
                .iter()
                .flatten()
                .copied()
                .collect(),
            node_count_per_type: metadata.node_count_per_type.clone(),
            edge_count_per_type: metadata.edge_count_per_type.clone(),
            version: metadata.version,
        }))
    }
}

fn sparse_reply(reply: graphd_storage::SparseFeaturesReply) -> SparseFeaturesReply {
    SparseFeaturesReply {
        values: reply.values,
        indices: reply.indices,
        dimensions: reply.dimensions,
        indices_counts: reply.indices_counts,
        values_counts: reply.values_counts,
    }
}

// =============================================================================
// Graph sampler service
// =============================================================================

/// Lifecycle service for global node/edge samplers.
#[derive(Debug, Clone)]
pub struct GraphSamplerService {
    engine: Arc<GraphEngine>,
    registry: Arc<SamplerRegistry>,
}

impl GraphSamplerService {
    pub fn new(engine: Arc<GraphEngine>, registry: Arc<SamplerRegistry>) -> Self {
        Self { engine, registry }
    }
}

#[tonic::async_trait]
impl GraphSamplerRpc for GraphSamplerService {
    async fn create(
        &self,
        request: Request<CreateSamplerRequest>,
    ) -> Result<Response<CreateSamplerReply>, Status> {
        let req = request.into_inner();
        let category = match Category::try_from(req.category) {
            Ok(Category::Weighted) => SamplerCategory::Weighted,
            Ok(Category::UniformWithReplacement) => SamplerCategory::UniformWithReplacement,
            Ok(Category::UniformWithoutReplacement) => SamplerCategory::UniformWithoutReplacement,
            Err(_) => return Err(Status::invalid_argument("unknown sampler category")),
        };

        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let is_edge = req.is_edge;
        let (sampler_id, weight) = run_blocking(move || {
            registry.create(&engine, &req.entity_types, req.is_edge, category)
        })
        .await?;
        tracing::info!(sampler_id, weight, is_edge, %category, "sampler created");
        Ok(Response::new(CreateSamplerReply { sampler_id, weight }))
    }

    async fn sample(
        &self,
        request: Request<SampleRequest>,
    ) -> Result<Response<SampleReply>, Status> {
        let req = request.into_inner();
        let registry = Arc::clone(&self.registry);
        let set = run_blocking(move || {
            registry.sample(req.sampler_id, req.seed, req.count as usize, req.is_edge)
        })
        .await?
        .map_err(request_error_status)?;
        Ok(Response::new(SampleReply {
            types: set.types,
            node_ids: set.node_ids,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
