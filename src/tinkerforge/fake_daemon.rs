//! In-memory Brick Daemon with a humidity, temperature, IO-4 and stepper device

use bytes::Bytes;
use ior_shared::codec::{self, decode_uid, ErrorCode, FrameDecoder, Packet, PacketHeader};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const HUMIDITY_UID: &str = "keg";
pub const TEMPERATURE_UID: &str = "6Jf";
pub const STEPPER_UID: &str = "6e6afb";
pub const IO_UID: &str = "hAH";

/// State-changing calls received by the stepper brick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Enable,
    Disable,
    Stop,
    SetSteps(i32),
    SetCurrentPosition(i32),
}

pub struct FakeDaemon {
    callback_noise: bool,
    switch_channel: u8,
    polls_until_switch: u32,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            callback_noise: false,
            switch_channel: 2,
            polls_until_switch: 3,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Send a callback packet ahead of every response
    pub fn with_callback_noise(mut self) -> Self {
        self.callback_noise = true;
        self
    }

    /// The limit switch on `channel` closes after `polls` reads of the IO-4
    pub fn with_limit_switch(mut self, channel: u8, polls: u32) -> Self {
        self.switch_channel = channel;
        self.polls_until_switch = polls;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        self.calls.clone()
    }

    pub fn spawn(self, mut stream: DuplexStream) {
        let humidity = decode_uid(HUMIDITY_UID).unwrap();
        let temperature = decode_uid(TEMPERATURE_UID).unwrap();
        let stepper = decode_uid(STEPPER_UID).unwrap();
        let io = decode_uid(IO_UID).unwrap();

        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut chunk = [0u8; 256];
            let mut remaining = 0i32;
            let mut polls_left = self.polls_until_switch;

            loop {
                let read = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                decoder.extend(&chunk[..read]);

                while let Ok(Some(request)) = decoder.decode_next() {
                    let uid = request.header.uid;
                    let argument = || i32::from_le_bytes(request.payload[..4].try_into().unwrap());
                    let record = |call: Call| self.calls.lock().unwrap().push(call);

                    let (payload, error): (Vec<u8>, u8) = match request.header.function_id {
                        1 if uid == humidity => (452u16.to_le_bytes().to_vec(), 0),
                        1 if uid == temperature => (2150i16.to_le_bytes().to_vec(), 0),
                        _ if uid == humidity || uid == temperature => (Vec::new(), 2),
                        2 if uid == io => {
                            let mut mask = 0b1111u8;
                            if polls_left == 0 {
                                mask &= !(1 << self.switch_channel);
                            } else {
                                polls_left -= 1;
                            }
                            (vec![mask], 0)
                        }
                        7 if uid == stepper => {
                            record(Call::SetCurrentPosition(argument()));
                            (Vec::new(), 0)
                        }
                        11 if uid == stepper => {
                            remaining = argument();
                            record(Call::SetSteps(remaining));
                            (Vec::new(), 0)
                        }
                        13 if uid == stepper => {
                            let reply = remaining.to_le_bytes().to_vec();
                            remaining -= remaining.clamp(-10_000, 10_000);
                            (reply, 0)
                        }
                        18 if uid == stepper => {
                            remaining = 0;
                            record(Call::Stop);
                            (Vec::new(), 0)
                        }
                        24 if uid == stepper => {
                            record(Call::Enable);
                            (Vec::new(), 0)
                        }
                        25 if uid == stepper => {
                            record(Call::Disable);
                            (Vec::new(), 0)
                        }
                        // Unknown devices never answer
                        _ => continue,
                    };

                    let mut out = Vec::new();
                    if self.callback_noise {
                        let callback = Packet::request(uid, 40, 0, false, &[0; 4]).unwrap();
                        out.extend_from_slice(&codec::encode(&callback));
                    }

                    let response = Packet {
                        header: PacketHeader {
                            error_code: ErrorCode::from(error),
                            ..request.header
                        },
                        payload: Bytes::from(payload),
                    };
                    out.extend_from_slice(&codec::encode(&response));

                    if stream.write_all(&out).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}
