//! Request/response client for the Brick Daemon
//!
//! One outstanding request at a time. Every request asks for a response;
//! callbacks and stale responses that arrive while waiting are dropped.

use crate::devices::SensorBrickConnection;
use crate::tinkerforge::bricklets::{HumidityBricklet, TemperatureBricklet};
use crate::transport::{TransportConnector, TransportStream};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use ior_shared::codec::{self, ErrorCode, FrameDecoder, Packet, MAX_SEQUENCE};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, trace};

struct Link<S> {
    stream: S,
    decoder: FrameDecoder,
}

/// Connection to a Brick Daemon over any transport
pub struct IpConnection<C: TransportConnector> {
    connector: C,
    response_timeout: Duration,
    link: Option<Link<C::Stream>>,
    sequence: u8,
}

impl<C: TransportConnector> IpConnection<C> {
    pub fn new(connector: C, response_timeout: Duration) -> Self {
        Self {
            connector,
            response_timeout,
            link: None,
            sequence: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub async fn connect(&mut self) -> Result<()> {
        let stream = self.connector.connect().await?;
        self.link = Some(Link {
            stream,
            decoder: FrameDecoder::new(),
        });
        info!("Connected to Brick Daemon at {}", self.connector.endpoint());
        Ok(())
    }

    /// Connect unless a link is already open
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if !self.is_connected() {
            self.connect().await?;
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            TransportStream::shutdown(&mut link.stream).await?;
            debug!("Disconnected from Brick Daemon at {}", self.connector.endpoint());
        }
        Ok(())
    }

    fn next_sequence(&mut self) -> u8 {
        self.sequence = if self.sequence >= MAX_SEQUENCE { 1 } else { self.sequence + 1 };
        self.sequence
    }

    /// Call `function_id` on device `uid` and return the response payload
    pub async fn request(&mut self, uid: u32, function_id: u8, payload: &[u8]) -> Result<Bytes> {
        let sequence = self.next_sequence();
        let request = Packet::request(uid, function_id, sequence, true, payload)?;
        let response_timeout = self.response_timeout;

        let link = self
            .link
            .as_mut()
            .ok_or_else(|| anyhow!("Not connected to Brick Daemon"))?;

        trace!(uid, function_id, sequence, "Brick Daemon request");
        link.stream.write_all(&codec::encode(&request)).await?;
        link.stream.flush().await?;

        let response = timeout(response_timeout, read_response(link, &request))
            .await
            .with_context(|| {
                format!(
                    "No response from device {} (function {}) within {:?}",
                    uid, function_id, response_timeout
                )
            })??;

        match response.header.error_code {
            ErrorCode::Ok => Ok(response.payload),
            code => bail!("Device {} rejected function {}: {}", uid, function_id, code),
        }
    }
}

async fn read_response<S: TransportStream>(link: &mut Link<S>, request: &Packet) -> Result<Packet> {
    let mut chunk = [0u8; 256];

    loop {
        while let Some(packet) = link.decoder.decode_next()? {
            if packet.answers(&request.header) {
                return Ok(packet);
            }
            if packet.is_callback() {
                trace!(uid = packet.header.uid, "Dropping callback");
            } else {
                debug!(
                    uid = packet.header.uid,
                    sequence = packet.header.sequence,
                    "Dropping unrelated response"
                );
            }
        }

        let read = link.stream.read(&mut chunk).await?;
        if read == 0 {
            bail!("Brick Daemon closed the connection");
        }
        link.decoder.extend(&chunk[..read]);
    }
}

#[async_trait]
impl<C: TransportConnector> SensorBrickConnection for IpConnection<C> {
    async fn connect(&mut self) -> Result<()> {
        IpConnection::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        IpConnection::disconnect(self).await
    }

    async fn read_humidity(&mut self, uid: &str) -> Result<f64> {
        HumidityBricklet::new(uid)?.get_humidity(self).await
    }

    async fn read_temperature(&mut self, uid: &str) -> Result<f64> {
        TemperatureBricklet::new(uid)?.get_temperature(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tinkerforge::fake_daemon::{FakeDaemon, HUMIDITY_UID, TEMPERATURE_UID};
    use crate::transport::DuplexConnector;

    fn connection(daemon: FakeDaemon) -> IpConnection<DuplexConnector> {
        let (connector, mut devices) = DuplexConnector::pair(1);
        daemon.spawn(devices.remove(0));
        IpConnection::new(connector, Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_read_sensors() {
        let mut ipcon = connection(FakeDaemon::new());
        SensorBrickConnection::connect(&mut ipcon).await.expect("connect");

        let humidity = ipcon.read_humidity(HUMIDITY_UID).await.expect("humidity");
        let temperature = ipcon.read_temperature(TEMPERATURE_UID).await.expect("temperature");

        assert!((humidity - 45.2).abs() < 1e-9);
        assert!((temperature - 21.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_callbacks_are_skipped() {
        let mut ipcon = connection(FakeDaemon::new().with_callback_noise());
        ipcon.connect().await.expect("connect");

        for _ in 0..3 {
            let humidity = ipcon.read_humidity(HUMIDITY_UID).await.expect("humidity");
            assert!((humidity - 45.2).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_unknown_device_times_out() {
        let mut ipcon = connection(FakeDaemon::new());
        ipcon.connect().await.expect("connect");

        let err = ipcon.read_humidity("zzz").await.unwrap_err();
        assert!(err.to_string().contains("No response from device"));
    }

    #[tokio::test]
    async fn test_error_code_is_reported() {
        let mut ipcon = connection(FakeDaemon::new());
        ipcon.connect().await.expect("connect");

        let uid = codec::decode_uid(HUMIDITY_UID).unwrap();
        let err = ipcon.request(uid, 99, &[]).await.unwrap_err();
        assert!(err.to_string().contains("function not supported"));
    }

    #[test]
    fn test_sequence_numbers_skip_zero() {
        let (connector, _devices) = DuplexConnector::pair(0);
        let mut ipcon = IpConnection::new(connector, Duration::from_millis(10));

        let sequence: Vec<u8> = (0..17).map(|_| ipcon.next_sequence()).collect();
        assert_eq!(sequence[0], 1);
        assert_eq!(sequence[14], 15);
        assert_eq!(sequence[15], 1);
        assert!(!sequence.contains(&0));
    }
}
