pub fn wrap_xml(xml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{xml}")
}

mod xml {
    use xmlserde::xml_serde_enum;
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Speak")]
        Speak(SpeakAction),
        #[xmlserde(name = b"Stream")]
        Stream(StreamAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SpeakAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    /// `<Stream>` opens a media socket to `url` for the answered leg.
    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct StreamAction {
        #[xmlserde(ty = "text")]
        pub url: String,
        #[xmlserde(name = b"bidirectional", ty = "attr")]
        pub bidirectional: XmlFlag,
        #[xmlserde(name = b"keepCallAlive", ty = "attr")]
        pub keep_call_alive: XmlFlag,
        #[xmlserde(name = b"contentType", ty = "attr")]
        pub content_type: Option<String>,
    }

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        XmlFlag {
            True => "true",
            False => "false",
        }
    }
}
pub use xml::*;

mod ws {
    use serde::{Deserialize, Serialize};

    /// Frames we (or the voice agent) send down a media socket.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", tag = "event")]
    pub enum PlivoOutbound {
        PlayAudio {
            media: OutboundMediaMeta,
            #[serde(
                rename = "streamId",
                default,
                skip_serializing_if = "Option::is_none"
            )]
            stream_id: Option<String>,
        },
        ClearAudio {
            #[serde(rename = "streamId")]
            stream_id: String,
        },
        Checkpoint {
            #[serde(rename = "streamId")]
            stream_id: String,
            name: String,
        },
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct OutboundMediaMeta {
        #[serde(rename = "contentType", default)]
        pub content_type: String,
        #[serde(rename = "sampleRate", default)]
        pub sample_rate: u32,
        pub payload: String,
    }

    /// Frames Plivo sends up a media socket.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase", tag = "event")]
    pub enum PlivoMessage {
        Start {
            start: StartMeta,
        },
        Media {
            media: MediaMeta,
        },
        Stop {},
        PlayedStream {},
        ClearedAudio {},
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct StartMeta {
        pub stream_id: String,
        pub call_id: String,
        pub account_id: String,
        pub tracks: Vec<String>,
        pub media_format: Option<MediaFormat>,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct MediaFormat {
        pub encoding: String,
        pub sample_rate: u32,
    }

    #[derive(Debug, Deserialize)]
    pub struct MediaMeta {
        #[serde(default)]
        pub track: Option<String>,
        pub payload: String,
    }
}
pub use ws::*;

mod rest {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    pub struct CreateCallPayload<'a> {
        pub from: &'a str,
        pub to: &'a str,
        pub answer_url: &'a str,
        pub answer_method: &'a str,
        pub hangup_url: &'a str,
        pub hangup_method: &'a str,
    }

    #[derive(Deserialize, Debug)]
    pub struct CreateCallResponse {
        pub request_uuid: String,
        #[serde(default)]
        pub message: String,
    }

    #[derive(Serialize, Debug)]
    pub struct RecordPayload<'a> {
        pub time_limit: u32,
        pub callback_url: &'a str,
        pub callback_method: &'a str,
    }
}
pub use rest::*;
