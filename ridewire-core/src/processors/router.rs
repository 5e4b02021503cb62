//! Inbound frame routing.
//!
//! The router decodes a text frame, works out which identity is acting
//! and forwards a typed command to the [`Dispatcher`]. Any
//! [`DispatchError`] is answered to the sending connection as
//! `requestFailed`; nothing here ever closes a socket.

use kanau::processor::Processor;
use ridewire_sdk::objects::{ClientMessage, DecodeError, DriverId, Place, Role, UserId};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DispatchError;
use crate::entities::Identity;
use crate::events::{
    AcceptRide, BookRide, CancelRide, ChannelHandle, CompleteRide, RejectRide, RequestRide,
    StartRide, SubscribeToDriver, UpdateLocation,
};
use crate::framework::Dispatcher;

/// A text frame received on a connection.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub connection: ChannelHandle,
    pub payload: String,
}

#[derive(Clone)]
pub struct MessageRouter {
    dispatcher: Arc<Dispatcher>,
}

impl MessageRouter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    async fn route(
        &self,
        connection: &ChannelHandle,
        message: ClientMessage,
    ) -> Result<(), DispatchError> {
        let dispatcher = &self.dispatcher;

        match message {
            ClientMessage::DriverConnect { driver_id } => {
                self.bind(connection, Identity::Driver(driver_id));
                Ok(())
            }
            ClientMessage::UserConnect { user_id } => {
                self.bind(connection, Identity::Rider(user_id));
                Ok(())
            }
            ClientMessage::LocationUpdate {
                role,
                driver_id,
                data,
            } => {
                expect_role(role, Role::Driver)?;
                let driver_id = self.driver(connection, Some(driver_id))?;
                dispatcher
                    .process(UpdateLocation { driver_id, data })
                    .await
                    .map(|_| ())
            }
            ClientMessage::SubscribeToDriverLocation { driver_id, user_id } => {
                let user_id = self.rider(connection, Some(user_id))?;
                dispatcher
                    .process(SubscribeToDriver {
                        origin: connection.clone(),
                        user_id,
                        driver_id,
                    })
                    .await
                    .map(|_| ())
            }
            ClientMessage::RequestRide {
                role,
                user_id,
                user_name,
                latitude,
                longitude,
                location_name,
                destination,
                radius,
            } => {
                expect_role(role, Role::User)?;
                let user_id = self.rider(connection, Some(user_id))?;
                dispatcher
                    .process(RequestRide {
                        origin: connection.clone(),
                        user_id,
                        user_name,
                        pickup: Place {
                            latitude,
                            longitude,
                            name: location_name,
                        },
                        destination,
                        radius_m: radius,
                    })
                    .await
                    .map(|_| ())
            }
            ClientMessage::BookRide {
                role,
                request_id,
                driver_id,
                fare,
                distance,
                destination,
            } => {
                expect_role(role, Role::User)?;
                let user_id = self.rider(connection, None)?;
                dispatcher
                    .process(BookRide {
                        origin: connection.clone(),
                        user_id,
                        request_id,
                        driver_id,
                        fare,
                        distance,
                        destination,
                    })
                    .await
            }
            ClientMessage::AcceptRide {
                role,
                request_id,
                driver_id,
                driver_name,
                estimated_arrival,
            } => {
                expect_role(role, Role::Driver)?;
                let driver_id = self.driver(connection, Some(driver_id))?;
                dispatcher
                    .process(AcceptRide {
                        driver_id,
                        request_id,
                        driver_name,
                        estimated_arrival,
                    })
                    .await
            }
            ClientMessage::RejectRide { role, request_id } => {
                expect_role(role, Role::Driver)?;
                let driver_id = self.driver(connection, None)?;
                dispatcher
                    .process(RejectRide {
                        driver_id,
                        request_id,
                    })
                    .await
            }
            ClientMessage::StartRide {
                role,
                request_id,
                ride_id,
            } => {
                expect_role(role, Role::Driver)?;
                let driver_id = self.driver(connection, None)?;
                dispatcher
                    .process(StartRide {
                        driver_id,
                        request_id,
                        ride_id,
                    })
                    .await
            }
            ClientMessage::CompleteRide {
                role,
                request_id,
                ride_id,
                fare,
            } => {
                expect_role(role, Role::Driver)?;
                let driver_id = self.driver(connection, None)?;
                dispatcher
                    .process(CompleteRide {
                        driver_id,
                        request_id,
                        ride_id,
                        fare,
                    })
                    .await
            }
            ClientMessage::CancelRideRequest {
                role,
                request_id,
                driver_id,
            } => {
                expect_role(role, Role::User)?;
                let user_id = self.rider(connection, None)?;
                dispatcher
                    .process(CancelRide {
                        origin: connection.clone(),
                        user_id,
                        request_id,
                        driver_id,
                    })
                    .await
            }
        }
    }

    fn bind(&self, connection: &ChannelHandle, identity: Identity) {
        let replaced = self
            .dispatcher
            .registry
            .bind(identity.clone(), connection.clone());
        info!(
            connection = %connection.id(),
            role = %identity.role(),
            %identity,
            replaced = replaced.is_some(),
            "Connection identified"
        );
    }

    /// The driver acting on `connection`, binding it on first use.
    fn driver(
        &self,
        connection: &ChannelHandle,
        asserted: Option<DriverId>,
    ) -> Result<DriverId, DispatchError> {
        match (self.dispatcher.registry.identity_of(connection.id()), asserted) {
            (Some(Identity::Driver(bound)), Some(asserted)) if bound != asserted => {
                Err(DispatchError::IdentityMismatch)
            }
            (Some(Identity::Driver(bound)), _) => Ok(bound),
            (Some(Identity::Rider(_)), _) => Err(DispatchError::RoleMismatch {
                expected: Role::Driver,
            }),
            (None, Some(asserted)) => {
                self.bind(connection, Identity::Driver(asserted.clone()));
                Ok(asserted)
            }
            (None, None) => Err(DispatchError::NotIdentified),
        }
    }

    /// The rider acting on `connection`, binding it on first use.
    fn rider(
        &self,
        connection: &ChannelHandle,
        asserted: Option<UserId>,
    ) -> Result<UserId, DispatchError> {
        match (self.dispatcher.registry.identity_of(connection.id()), asserted) {
            (Some(Identity::Rider(bound)), Some(asserted)) if bound != asserted => {
                Err(DispatchError::IdentityMismatch)
            }
            (Some(Identity::Rider(bound)), _) => Ok(bound),
            (Some(Identity::Driver(_)), _) => Err(DispatchError::RoleMismatch {
                expected: Role::User,
            }),
            (None, Some(asserted)) => {
                self.bind(connection, Identity::Rider(asserted.clone()));
                Ok(asserted)
            }
            (None, None) => Err(DispatchError::NotIdentified),
        }
    }
}

fn expect_role(role: Option<Role>, expected: Role) -> Result<(), DispatchError> {
    match role {
        Some(role) if role != expected => Err(DispatchError::RoleMismatch { expected }),
        _ => Ok(()),
    }
}

impl Processor<InboundFrame> for MessageRouter {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, frame: InboundFrame) -> Result<(), Infallible> {
        let connection = frame.connection;

        let message = match ClientMessage::decode(&frame.payload) {
            Ok(message) => message,
            Err(DecodeError::UnknownType(kind)) => {
                warn!(connection = %connection.id(), kind = %kind, "Unsupported message type");
                connection.deliver(DispatchError::UnsupportedMessage(kind).into_message());
                return Ok(());
            }
            Err(err) => {
                warn!(connection = %connection.id(), error = %err, "Dropping undecodable frame");
                return Ok(());
            }
        };

        let kind = message.kind();
        if let Err(err) = self.route(&connection, message).await {
            debug!(connection = %connection.id(), kind, error = %err, "Request failed");
            connection.deliver(err.into_message());
        }
        Ok(())
    }
}
