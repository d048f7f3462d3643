//! Catalogue of scalar per-virtual-server metrics.
//!
//! Every entry names a `serverinfo` field that is exported as
//! `teamspeak_<name>{virtualserver_name}`. Each entry declares how the raw
//! value has to parse; anything else is rejected at mapping time instead of
//! being exported as garbage.
//!
//! To export another field add one line to the `catalogue!` invocation below.

/// Prefix of every exported metric name.
pub const METRICS_PREFIX: &str = "teamspeak_";

/// Numeric type a `serverinfo` value is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Whole number: byte/packet counters, client counts, uptime.
    Integer,
    /// Floating point: packet loss ratios and averages.
    Ratio,
}

impl MetricKind {
    /// Parse a raw wire value. `None` if it is not a valid value of this kind.
    pub fn parse(self, raw: &str) -> Option<f64> {
        let raw = raw.trim();
        match self {
            Self::Integer => raw.parse::<i64>().ok().map(|v| v as f64),
            Self::Ratio => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

macro_rules! catalogue {
    ($($variant:ident => $name:literal, $kind:ident;)+) => {
        /// A scalar metric read from `serverinfo`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ScalarMetric {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl ScalarMetric {
            /// Every catalogue entry, in export order.
            pub const ALL: &'static [ScalarMetric] = &[$(ScalarMetric::$variant,)+];

            /// `serverinfo` field name, also the metric name without prefix.
            pub fn name(self) -> &'static str {
                match self {
                    $(ScalarMetric::$variant => $name,)+
                }
            }

            /// Declared numeric kind.
            pub fn kind(self) -> MetricKind {
                match self {
                    $(ScalarMetric::$variant => MetricKind::$kind,)+
                }
            }
        }
    };
}

catalogue! {
    BandwidthReceivedLastMinute => "connection_bandwidth_received_last_minute_total", Integer;
    BandwidthReceivedLastSecond => "connection_bandwidth_received_last_second_total", Integer;
    BandwidthSentLastMinute => "connection_bandwidth_sent_last_minute_total", Integer;
    BandwidthSentLastSecond => "connection_bandwidth_sent_last_second_total", Integer;
    BytesReceivedControl => "connection_bytes_received_control", Integer;
    BytesReceivedKeepalive => "connection_bytes_received_keepalive", Integer;
    BytesReceivedSpeech => "connection_bytes_received_speech", Integer;
    BytesReceivedTotal => "connection_bytes_received_total", Integer;
    BytesSentControl => "connection_bytes_sent_control", Integer;
    BytesSentKeepalive => "connection_bytes_sent_keepalive", Integer;
    BytesSentSpeech => "connection_bytes_sent_speech", Integer;
    BytesSentTotal => "connection_bytes_sent_total", Integer;
    FiletransferBandwidthReceived => "connection_filetransfer_bandwidth_received", Integer;
    FiletransferBandwidthSent => "connection_filetransfer_bandwidth_sent", Integer;
    FiletransferBytesReceivedTotal => "connection_filetransfer_bytes_received_total", Integer;
    FiletransferBytesSentTotal => "connection_filetransfer_bytes_sent_total", Integer;
    PacketsReceivedControl => "connection_packets_received_control", Integer;
    PacketsReceivedKeepalive => "connection_packets_received_keepalive", Integer;
    PacketsReceivedSpeech => "connection_packets_received_speech", Integer;
    PacketsReceivedTotal => "connection_packets_received_total", Integer;
    PacketsSentControl => "connection_packets_sent_control", Integer;
    PacketsSentKeepalive => "connection_packets_sent_keepalive", Integer;
    PacketsSentSpeech => "connection_packets_sent_speech", Integer;
    PacketsSentTotal => "connection_packets_sent_total", Integer;
    ChannelsOnline => "virtualserver_channelsonline", Integer;
    ClientConnections => "virtualserver_client_connections", Integer;
    ClientsOnline => "virtualserver_clientsonline", Integer;
    MaxClients => "virtualserver_maxclients", Integer;
    MonthBytesDownloaded => "virtualserver_month_bytes_downloaded", Integer;
    MonthBytesUploaded => "virtualserver_month_bytes_uploaded", Integer;
    QueryClientConnections => "virtualserver_query_client_connections", Integer;
    QueryClientsOnline => "virtualserver_queryclientsonline", Integer;
    ReservedSlots => "virtualserver_reserved_slots", Integer;
    TotalBytesDownloaded => "virtualserver_total_bytes_downloaded", Integer;
    TotalBytesUploaded => "virtualserver_total_bytes_uploaded", Integer;
    PacketlossControl => "virtualserver_total_packetloss_control", Ratio;
    PacketlossKeepalive => "virtualserver_total_packetloss_keepalive", Ratio;
    PacketlossSpeech => "virtualserver_total_packetloss_speech", Ratio;
    PacketlossTotal => "virtualserver_total_packetloss_total", Ratio;
    TotalPing => "virtualserver_total_ping", Ratio;
    Uptime => "virtualserver_uptime", Integer;
}

impl ScalarMetric {
    /// Full exported metric name.
    pub fn metric_name(self) -> String {
        format!("{METRICS_PREFIX}{}", self.name())
    }
}
