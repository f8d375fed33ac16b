//! PC/SC readers through the system smart card service.

use std::ffi::CString;

use ::pcsc::{Card, Context, Error as PcscError, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::backend::{CardBackend, CardChannel};
use crate::error::CardError;

pub struct PcscBackend {
    ctx: Context,
}

impl PcscBackend {
    /// Connect to the PC/SC service.
    pub fn establish() -> Result<Self, CardError> {
        let ctx = Context::establish(Scope::User)
            .map_err(|e| CardError::Unavailable(format!("PC/SC service: {}", e)))?;
        Ok(Self { ctx })
    }
}

fn connect_error(reader: &str, err: PcscError) -> CardError {
    match err {
        PcscError::NoReadersAvailable | PcscError::UnknownReader => {
            CardError::ReaderNotFound(reader.to_owned())
        }
        PcscError::NoSmartcard | PcscError::RemovedCard | PcscError::ResetCard => {
            CardError::Disconnected(format!("no card in {}", reader))
        }
        PcscError::SharingViolation => CardError::Busy(reader.to_owned()),
        PcscError::NoService | PcscError::ServiceStopped => {
            CardError::Unavailable(err.to_string())
        }
        err => CardError::Protocol(format!("connect to {}: {}", reader, err)),
    }
}

impl CardBackend for PcscBackend {
    fn list_readers(&self) -> Result<Vec<String>, CardError> {
        let len = match self.ctx.list_readers_len() {
            Ok(len) => len,
            Err(PcscError::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(CardError::Unavailable(format!("list readers: {}", e))),
        };
        let mut buf = vec![0u8; len];
        let names = match self.ctx.list_readers(&mut buf) {
            Ok(names) => names,
            Err(PcscError::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(CardError::Unavailable(format!("list readers: {}", e))),
        };
        Ok(names
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel + '_>, CardError> {
        let name = CString::new(reader)
            .map_err(|_| CardError::ReaderNotFound(reader.to_owned()))?;
        let card = self
            .ctx
            .connect(&name, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| connect_error(reader, e))?;
        log::debug!("connected to card in {}", reader);
        Ok(Box::new(PcscChannel {
            card,
            reader: reader.to_owned(),
        }))
    }

    fn name(&self) -> &'static str {
        "pcsc"
    }
}

struct PcscChannel {
    card: Card,
    reader: String,
}

impl CardChannel for PcscChannel {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        let mut buf = [0u8; MAX_BUFFER_SIZE];
        let resp = self
            .card
            .transmit(apdu, &mut buf)
            .map_err(|e| CardError::Disconnected(format!("{}: {}", self.reader, e)))?;
        Ok(resp.to_vec())
    }
}
