//! The client-facing gRPC surface: a thin translation layer between the
//! wire messages and `Engine` operations. No business logic lives here,
//! grounded on the original gRPC server handlers, which are equally thin.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::proto::broker::broker_service_server::BrokerService;
use crate::proto::broker::{
    ClosePositionRequest, ClosePositionResponse, GetBalanceRequest, GetBalanceResponse,
    OpenPositionRequest, OpenPositionResponse, SetBalanceRequest, SetBalanceResponse,
    SignInRequest, SignInResponse, SignUpRequest, SignUpResponse,
};
use tonic::{Request, Response, Status};

pub struct BrokerServer {
    engine: Engine,
}

impl BrokerServer {
    pub fn new(engine: Engine) -> Self {
        BrokerServer { engine }
    }
}

#[tonic::async_trait]
impl BrokerService for BrokerServer {
    async fn sign_up(&self, request: Request<SignUpRequest>) -> Result<Response<SignUpResponse>, Status> {
        let deposit = request.into_inner().deposit;
        let user_id = self.engine.sign_up(deposit).await.map_err(engine_error_to_status)?;
        Ok(Response::new(SignUpResponse { user_id }))
    }

    async fn sign_in(&self, _request: Request<SignInRequest>) -> Result<Response<SignInResponse>, Status> {
        Ok(Response::new(SignInResponse {}))
    }

    async fn open_position(
        &self,
        request: Request<OpenPositionRequest>,
    ) -> Result<Response<OpenPositionResponse>, Status> {
        let request = request.into_inner();
        let position_id = self
            .engine
            .open_position(
                request.user_id,
                request.symbol_id,
                request.price,
                request.count,
                request.stop_loss,
                request.take_profit,
                request.is_buy,
            )
            .await
            .map_err(engine_error_to_status)?;
        Ok(Response::new(OpenPositionResponse { position_id }))
    }

    async fn close_position(
        &self,
        request: Request<ClosePositionRequest>,
    ) -> Result<Response<ClosePositionResponse>, Status> {
        let position_id = request.into_inner().position_id;
        self.engine.close_position(position_id).await.map_err(engine_error_to_status)?;
        Ok(Response::new(ClosePositionResponse {}))
    }

    async fn set_balance(
        &self,
        request: Request<SetBalanceRequest>,
    ) -> Result<Response<SetBalanceResponse>, Status> {
        let request = request.into_inner();
        self.engine
            .set_balance(request.user_id, request.sum)
            .await
            .map_err(engine_error_to_status)?;
        Ok(Response::new(SetBalanceResponse {}))
    }

    async fn get_balance(
        &self,
        request: Request<GetBalanceRequest>,
    ) -> Result<Response<GetBalanceResponse>, Status> {
        let user_id = request.into_inner().user_id;
        let sum = self.engine.get_balance(user_id).await.map_err(engine_error_to_status)?;
        Ok(Response::new(GetBalanceResponse { sum }))
    }
}

fn engine_error_to_status(err: EngineError) -> Status {
    match err {
        EngineError::UnknownSymbol(_) | EngineError::PriceChanged => Status::invalid_argument(err.to_string()),
        EngineError::UnknownUser(_) | EngineError::UnknownPosition(_) => Status::not_found(err.to_string()),
        EngineError::InsufficientFunds { .. } => Status::failed_precondition(err.to_string()),
        EngineError::Store(_) => Status::internal(err.to_string()),
        EngineError::Cancelled => Status::cancelled(err.to_string()),
    }
}
