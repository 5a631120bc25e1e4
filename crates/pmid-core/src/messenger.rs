//! Envelope exchange over the transport.
//!
//! Outgoing envelopes are signed by the session's active identity and
//! published as frames. Incoming frames are decoded, verified against the
//! peer directory and turned into [`IncomingEvent`]s. Anything that fails to
//! decode or verify is dropped with an error; it never reaches the caller as
//! trusted content.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pmid_crypto::{
    encrypt_message,
    payloads::{chat_signing_bytes_v1, handshake_signing_bytes_v1},
    utils::random_array,
    verify_chat_v1, PublicKey,
};
use pmid_proto::{
    decode_frame, encode_frame, Attachment, ChatMessage, Envelope, Handshake, KeyRotation,
    TypingIndicator,
};

use crate::collaborators::{BlobStore, Transport};
use crate::directory::PeerDirectory;
use crate::errors::{MessengerError, SessionError};
use crate::rotation::RotationPhase;
use crate::session::IdentitySession;
use crate::store::now_unix;

const CHAT_NONCE_LEN: usize = 16;

/// Topic naming for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Per-user inbox topics are `<inbox_prefix>/<user_id>`.
    pub inbox_prefix: String,
    /// Handshakes and rotations are broadcast here.
    pub identity_topic: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            inbox_prefix: "pmid/inbox".to_string(),
            identity_topic: "pmid/identity".to_string(),
        }
    }
}

impl Topics {
    pub fn inbox(&self, user_id: &str) -> String {
        format!("{}/{}", self.inbox_prefix, user_id)
    }
}

/// Attachment to upload alongside a chat message.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Plaintext(Vec<u8>),
    /// Verified sender, but the content could not be opened with the
    /// current identity (e.g. it was sealed to a key rotated away).
    Undecryptable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: String,
    pub sender_user_id: String,
    pub content_type: String,
    pub timestamp: u64,
    pub body: MessageBody,
    pub attachment: Option<Attachment>,
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    Chat(ReceivedMessage),
    PeerAnnounced {
        user_id: String,
        public_key: PublicKey,
    },
    PeerRotated {
        user_id: String,
        public_key: PublicKey,
        sequence: u32,
    },
    Typing(TypingIndicator),
}

pub struct Messenger {
    transport: Arc<dyn Transport>,
    blobs: Arc<dyn BlobStore>,
    directory: Arc<PeerDirectory>,
    topics: Topics,
}

impl Messenger {
    pub fn new(
        transport: Arc<dyn Transport>,
        blobs: Arc<dyn BlobStore>,
        directory: Arc<PeerDirectory>,
        topics: Topics,
    ) -> Self {
        Self {
            transport,
            blobs,
            directory,
            topics,
        }
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    async fn publish(&self, topic: &str, envelope: Envelope) -> Result<(), MessengerError> {
        let frame = encode_frame(&envelope)?;
        debug!(topic, kind = %envelope.kind(), len = frame.len(), "publishing envelope");
        self.transport.publish(topic, Bytes::from(frame)).await?;
        Ok(())
    }

    fn active_key(session: &IdentitySession) -> Result<PublicKey, MessengerError> {
        session
            .public_key()
            .ok_or_else(|| SessionError::NoActiveIdentity(session.user_id().to_string()).into())
    }

    /// Broadcast the session's current public key.
    pub async fn announce(&self, session: &IdentitySession) -> Result<Handshake, MessengerError> {
        let key = Self::active_key(session)?;
        let wallet_type = session
            .wallet_type()
            .ok_or_else(|| SessionError::NoActiveIdentity(session.user_id().to_string()))?;

        let mut hs = Handshake {
            user_id: session.user_id().to_string(),
            public_key: key.to_vec(),
            wallet_type,
            timestamp: now_unix(),
            signature: Vec::new(),
        };
        hs.signature = session.sign(&handshake_signing_bytes_v1(&hs)).await?;

        self.publish(&self.topics.identity_topic, hs.clone().into()).await?;
        info!(user_id = %hs.user_id, wallet_type = %hs.wallet_type, "announced identity");
        Ok(hs)
    }

    /// Seal `plaintext` to the recipient's current key, sign and publish to
    /// their inbox. The attachment, if any, is uploaded first.
    pub async fn send_chat(
        &self,
        session: &IdentitySession,
        recipient_user_id: &str,
        plaintext: &[u8],
        content_type: &str,
        attachment: Option<OutgoingAttachment>,
        reply_to_id: Option<String>,
    ) -> Result<ChatMessage, MessengerError> {
        Self::active_key(session)?;
        let recipient_key = self
            .directory
            .current_key(recipient_user_id)
            .await
            .ok_or_else(|| MessengerError::UnknownPeer(recipient_user_id.to_string()))?;

        let attachment = match attachment {
            Some(a) => {
                let file_size = a.data.len() as u64;
                let content_address = self.blobs.upload(a.data).await?;
                Some(Attachment {
                    content_address,
                    file_name: a.file_name,
                    mime_type: a.mime_type,
                    file_size,
                })
            }
            None => None,
        };

        let nonce: [u8; CHAT_NONCE_LEN] = random_array()?;
        let mut msg = ChatMessage {
            id: Uuid::new_v4().to_string(),
            sender_user_id: session.user_id().to_string(),
            recipient_user_id: recipient_user_id.to_string(),
            encrypted_content: encrypt_message(plaintext, &recipient_key)?,
            content_type: content_type.to_string(),
            timestamp: now_unix(),
            signature: Vec::new(),
            nonce: nonce.to_vec(),
            attachment,
            reply_to_id,
        };
        msg.signature = session.sign(&chat_signing_bytes_v1(&msg)).await?;

        self.publish(&self.topics.inbox(recipient_user_id), msg.clone().into())
            .await?;
        debug!(id = %msg.id, to = recipient_user_id, "sent chat message");
        Ok(msg)
    }

    /// Typing indicators are unsigned and best-effort.
    pub async fn send_typing(
        &self,
        session: &IdentitySession,
        recipient_user_id: &str,
        conversation_id: &str,
        is_typing: bool,
    ) -> Result<(), MessengerError> {
        let indicator = TypingIndicator {
            user_id: session.user_id().to_string(),
            conversation_id: conversation_id.to_string(),
            is_typing,
            timestamp: now_unix(),
        };
        self.publish(&self.topics.inbox(recipient_user_id), indicator.into())
            .await
    }

    /// Broadcast a proposed rotation and settle the session accordingly:
    /// a successful publish completes the rotation, a failed one aborts it
    /// and the temp identity stays active.
    pub async fn broadcast_rotation(
        &self,
        session: &mut IdentitySession,
        rot: &KeyRotation,
    ) -> Result<RotationPhase, MessengerError> {
        match self
            .publish(&self.topics.identity_topic, rot.clone().into())
            .await
        {
            Ok(()) => Ok(session.complete_rotation().await?),
            Err(e) => {
                warn!(user_id = %rot.user_id, error = %e, "rotation broadcast failed");
                session.abort_rotation()?;
                Err(e)
            }
        }
    }

    /// Decode and verify one frame received from the transport.
    pub async fn handle_incoming(
        &self,
        session: &IdentitySession,
        frame: &[u8],
    ) -> Result<IncomingEvent, MessengerError> {
        match decode_frame(frame)? {
            Envelope::Handshake(hs) => self.on_handshake(hs).await,
            Envelope::KeyRotation(rot) => self.on_rotation(rot).await,
            Envelope::Chat(msg) => self.on_chat(session, msg).await,
            Envelope::Typing(indicator) => Ok(IncomingEvent::Typing(indicator)),
        }
    }

    async fn on_handshake(&self, hs: Handshake) -> Result<IncomingEvent, MessengerError> {
        let public_key = self.directory.accept_handshake(&hs).await?;
        Ok(IncomingEvent::PeerAnnounced {
            user_id: hs.user_id,
            public_key,
        })
    }

    async fn on_rotation(&self, rot: KeyRotation) -> Result<IncomingEvent, MessengerError> {
        // Without a recorded key the rotation has nothing to chain from.
        let Some(expected_old) = self.directory.current_key(&rot.user_id).await else {
            debug!(user_id = %rot.user_id, "rotation for unknown peer");
            return Err(MessengerError::UnknownPeer(rot.user_id));
        };
        let public_key = self.directory.accept_rotation(&rot, &expected_old).await?;
        Ok(IncomingEvent::PeerRotated {
            user_id: rot.user_id,
            public_key,
            sequence: rot.sequence_number,
        })
    }

    async fn on_chat(
        &self,
        session: &IdentitySession,
        msg: ChatMessage,
    ) -> Result<IncomingEvent, MessengerError> {
        if msg.recipient_user_id != session.user_id() {
            return Err(MessengerError::NotForUs(msg.recipient_user_id));
        }
        let sender_key = self
            .directory
            .current_key(&msg.sender_user_id)
            .await
            .ok_or_else(|| MessengerError::UnknownPeer(msg.sender_user_id.clone()))?;
        if !verify_chat_v1(&msg, &sender_key) {
            warn!(id = %msg.id, from = %msg.sender_user_id, "chat signature invalid");
            return Err(MessengerError::SignatureInvalid {
                kind: "chat",
                user_id: msg.sender_user_id,
            });
        }

        let body = match session.decrypt(&msg.encrypted_content).await {
            Ok(plaintext) => MessageBody::Plaintext(plaintext),
            Err(e) => {
                warn!(id = %msg.id, from = %msg.sender_user_id, error = %e, "could not open message");
                MessageBody::Undecryptable
            }
        };

        Ok(IncomingEvent::Chat(ReceivedMessage {
            id: msg.id,
            sender_user_id: msg.sender_user_id,
            content_type: msg.content_type,
            timestamp: msg.timestamp,
            body,
            attachment: msg.attachment,
            reply_to_id: msg.reply_to_id,
        }))
    }

    pub async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Bytes, MessengerError> {
        Ok(self.blobs.download(&attachment.content_address).await?)
    }
}
