use std::mem;

use cobaltrdp_core::{decode, encode_buf, WriteBuf};
use cobaltrdp_pdu::rdp::capability_sets::{self, CapabilitySet};
use cobaltrdp_pdu::rdp::client_info::{
    AddressFamily, ClientInfo, ClientInfoFlags, CompressionType, Credentials as InfoCredentials, ExtendedClientInfo,
    PerformanceFlags, TimezoneInfo,
};
use cobaltrdp_pdu::rdp::headers::ShareControlPdu;
use cobaltrdp_pdu::rdp::ClientInfoPdu;
use cobaltrdp_pdu::x224::{X224, X224Data};
use cobaltrdp_pdu::{gcc, mcs, nego, PduHint};

use crate::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
use crate::finalization::ConnectionFinalizationSequence;
use crate::io_channel::{decode_send_data_indication, decode_share_control, encode_share_control};
use crate::license::LicenseExchangeSequence;
use crate::{
    encode_x224_packet, Config, ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult,
    DesktopSize, Sequence, State, Written,
};

/// How many pointer sprites the client keeps; advertised in the Pointer
/// capability set and mirrored by the session pointer cache.
pub const POINTER_CACHE_SIZE: u16 = 25;

/// What the connection sequence negotiated for the active phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedCapabilities {
    pub desktop_size: DesktopSize,
    /// Server granted fast-path input and the configuration enables it.
    pub fast_path_input: bool,
    pub pointer_cache_size: u16,
}

#[derive(Debug)]
pub struct ConnectionResult {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    pub share_id: u32,
    pub capabilities: NegotiatedCapabilities,
}

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ClientConnectorState {
    #[default]
    Consumed,

    ConnectionInitiationSendRequest,
    ConnectionInitiationWaitConfirm {
        requested_protocol: nego::SecurityProtocol,
    },
    EnhancedSecurityUpgrade {
        selected_protocol: nego::SecurityProtocol,
    },
    Credssp {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeSendInitial {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeWaitResponse,
    ChannelConnection {
        io_channel_id: u16,
        channel_connection: ChannelConnectionSequence,
    },
    SecureSettingsExchange {
        io_channel_id: u16,
        user_channel_id: u16,
    },
    LicensingExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        license_exchange: LicenseExchangeSequence,
    },
    CapabilitiesExchange {
        io_channel_id: u16,
        user_channel_id: u16,
    },
    ConnectionFinalization {
        io_channel_id: u16,
        user_channel_id: u16,
        capabilities: NegotiatedCapabilities,
        connection_finalization: ConnectionFinalizationSequence,
    },
    Connected {
        result: ConnectionResult,
    },
}

impl State for ClientConnectorState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::ConnectionInitiationSendRequest => "ConnectionInitiationSendRequest",
            Self::ConnectionInitiationWaitConfirm { .. } => "ConnectionInitiationWaitConfirm",
            Self::EnhancedSecurityUpgrade { .. } => "EnhancedSecurityUpgrade",
            Self::Credssp { .. } => "Credssp",
            Self::BasicSettingsExchangeSendInitial { .. } => "BasicSettingsExchangeSendInitial",
            Self::BasicSettingsExchangeWaitResponse => "BasicSettingsExchangeWaitResponse",
            Self::ChannelConnection { .. } => "ChannelConnection",
            Self::SecureSettingsExchange { .. } => "SecureSettingsExchange",
            Self::LicensingExchange { .. } => "LicensingExchange",
            Self::CapabilitiesExchange { .. } => "CapabilitiesExchange",
            Self::ConnectionFinalization { .. } => "ConnectionFinalization",
            Self::Connected { .. } => "Connected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// The connection-establishment state machine, from the X.224 Connection
/// Request up to the active session.
///
/// The two async-only moments of the sequence (the TLS upgrade and the
/// CredSSP exchange) are modeled as explicit states the transport driver
/// recognizes via [`ClientConnector::should_perform_security_upgrade`] and
/// [`ClientConnector::should_perform_credssp`].
#[derive(Debug)]
pub struct ClientConnector {
    pub config: Config,
    pub state: ClientConnectorState,
    /// The client address to report in the Client Info PDU.
    pub client_addr: String,
}

impl ClientConnector {
    pub fn new(config: Config, client_addr: String) -> Self {
        Self {
            config,
            state: ClientConnectorState::ConnectionInitiationSendRequest,
            client_addr,
        }
    }

    pub fn should_perform_security_upgrade(&self) -> bool {
        matches!(self.state, ClientConnectorState::EnhancedSecurityUpgrade { .. })
    }

    /// Advances past the TLS upgrade point.
    ///
    /// Must only be called when [`Self::should_perform_security_upgrade`] is true.
    pub fn mark_security_upgrade_as_done(&mut self) -> ConnectorResult<()> {
        debug_assert!(self.should_perform_security_upgrade());
        self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_security_upgrade());
        Ok(())
    }

    pub fn should_perform_credssp(&self) -> bool {
        matches!(self.state, ClientConnectorState::Credssp { .. })
    }

    /// Advances past the CredSSP exchange.
    ///
    /// Must only be called when [`Self::should_perform_credssp`] is true.
    pub fn mark_credssp_as_done(&mut self) -> ConnectorResult<()> {
        debug_assert!(self.should_perform_credssp());
        let res = self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_credssp());
        debug_assert_eq!(res, Written::Nothing);
        Ok(())
    }

    pub fn selected_protocol(&self) -> Option<nego::SecurityProtocol> {
        match &self.state {
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol }
            | ClientConnectorState::Credssp { selected_protocol }
            | ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => Some(*selected_protocol),
            _ => None,
        }
    }
}

impl Sequence for ClientConnector {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match &self.state {
            ClientConnectorState::Consumed => None,
            ClientConnectorState::ConnectionInitiationSendRequest => None,
            ClientConnectorState::ConnectionInitiationWaitConfirm { .. } => Some(&cobaltrdp_pdu::X224_HINT),
            ClientConnectorState::EnhancedSecurityUpgrade { .. } => None,
            ClientConnectorState::Credssp { .. } => None,
            ClientConnectorState::BasicSettingsExchangeSendInitial { .. } => None,
            ClientConnectorState::BasicSettingsExchangeWaitResponse => Some(&cobaltrdp_pdu::X224_HINT),
            ClientConnectorState::ChannelConnection { channel_connection, .. } => channel_connection.next_pdu_hint(),
            ClientConnectorState::SecureSettingsExchange { .. } => None,
            ClientConnectorState::LicensingExchange { license_exchange, .. } => license_exchange.next_pdu_hint(),
            ClientConnectorState::CapabilitiesExchange { .. } => Some(&cobaltrdp_pdu::X224_HINT),
            ClientConnectorState::ConnectionFinalization {
                connection_finalization,
                ..
            } => connection_finalization.next_pdu_hint(),
            ClientConnectorState::Connected { .. } => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            // Invalid state
            ClientConnectorState::Consumed => {
                return Err(general_err!("connector sequence state is consumed (this is a bug)"))
            }

            //== Connection Initiation ==//
            // Exchange the supported security protocols.
            ClientConnectorState::ConnectionInitiationSendRequest => {
                debug!("Connection Initiation");

                // NLA is the only supported security protocol; SSL is
                // included because CredSSP is a superset of TLS.
                let security_protocol = nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::SSL;

                let connection_request = nego::ConnectionRequest {
                    cookie: Some(truncate_cookie(&self.config.credentials.username)),
                    flags: nego::RequestFlags::empty(),
                    protocol: security_protocol,
                };

                debug!(message = ?connection_request, "Send");

                let written = encode_buf(&X224(connection_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionInitiationWaitConfirm {
                        requested_protocol: security_protocol,
                    },
                )
            }
            ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol } => {
                let connection_confirm = decode::<X224<nego::ConnectionConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                debug!(message = ?connection_confirm, "Received");

                let (flags, selected_protocol) = match connection_confirm {
                    nego::ConnectionConfirm::Response { flags, protocol } => (flags, protocol),
                    nego::ConnectionConfirm::Failure { code } => {
                        error!(?code, "Received connection failure code");
                        return Err(ConnectorError::new(
                            "negotiation failure",
                            ConnectorErrorKind::Negotiation(code),
                        ));
                    }
                };

                info!(?selected_protocol, ?flags, "Server confirmed connection");

                if !selected_protocol.intersects(requested_protocol) {
                    return Err(reason_err!(
                        "Initiation",
                        "client advertised {requested_protocol:?}, but server selected {selected_protocol:?}",
                    ));
                }

                if !selected_protocol.intersects(nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::HYBRID_EX) {
                    return Err(reason_err!("Initiation", "server refused NLA security"));
                }

                (
                    Written::Nothing,
                    ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol },
                )
            }

            //== Upgrade to Enhanced RDP Security ==//
            // The transport driver performs the TLS handshake here and
            // re-enters via mark_security_upgrade_as_done.
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::Credssp { selected_protocol },
            ),

            //== CredSSP ==//
            // Driven by the transport via CredsspSequence; re-entered via
            // mark_credssp_as_done.
            ClientConnectorState::Credssp { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol },
            ),

            //== Basic Settings Exchange ==//
            // Exchange the GCC Core, Security and Network blocks.
            ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => {
                debug!("Basic Settings Exchange");

                let client_gcc_blocks = create_gcc_blocks(&self.config, selected_protocol);

                let connect_initial = mcs::ConnectInitial::with_gcc_blocks(client_gcc_blocks);

                debug!(message = ?connect_initial, "Send");

                let written = encode_x224_packet(&connect_initial, output)?;

                (Written::from_size(written)?, ClientConnectorState::BasicSettingsExchangeWaitResponse)
            }
            ClientConnectorState::BasicSettingsExchangeWaitResponse => {
                let x224_payload = decode::<X224<X224Data>>(input).map_err(ConnectorError::decode)?.0;
                let connect_response =
                    decode::<mcs::ConnectResponse>(x224_payload.data.as_ref()).map_err(ConnectorError::decode)?;

                debug!(message = ?connect_response, "Received");

                let static_channel_ids = connect_response.channel_ids();
                let io_channel_id = connect_response.io_channel_id();

                debug!(?static_channel_ids, io_channel_id);

                (
                    Written::Nothing,
                    ClientConnectorState::ChannelConnection {
                        io_channel_id,
                        channel_connection: ChannelConnectionSequence::new(io_channel_id, static_channel_ids),
                    },
                )
            }

            //== Channel Connection ==//
            // Attach the user and join every channel.
            ClientConnectorState::ChannelConnection {
                io_channel_id,
                mut channel_connection,
            } => {
                debug!("Channel Connection");
                let written = channel_connection.step(input, output)?;

                let next_state = if let ChannelConnectionState::AllJoined { user_channel_id } = channel_connection.state
                {
                    ClientConnectorState::SecureSettingsExchange {
                        io_channel_id,
                        user_channel_id,
                    }
                } else {
                    ClientConnectorState::ChannelConnection {
                        io_channel_id,
                        channel_connection,
                    }
                };

                (written, next_state)
            }

            //== Secure Settings Exchange ==//
            // Send the Client Info PDU (credentials, performance hints).
            ClientConnectorState::SecureSettingsExchange {
                io_channel_id,
                user_channel_id,
            } => {
                debug!("Secure Settings Exchange");

                let client_info = create_client_info_pdu(&self.config, &self.client_addr);

                debug!(message = ?client_info, "Send");

                let written = crate::encode_send_data_request(user_channel_id, io_channel_id, &client_info, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        license_exchange: LicenseExchangeSequence::new(io_channel_id),
                    },
                )
            }

            //== Licensing ==//
            // Expect the valid-client license error message.
            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                mut license_exchange,
            } => {
                debug!("Licensing Exchange");

                let written = license_exchange.step(input, output)?;

                let next_state = if license_exchange.state.is_terminal() {
                    ClientConnectorState::CapabilitiesExchange {
                        io_channel_id,
                        user_channel_id,
                    }
                } else {
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        license_exchange,
                    }
                };

                (written, next_state)
            }

            //== Capabilities Exchange ==//
            // The server presents its capability sets; the client echoes the
            // share id and replies with its own sets.
            ClientConnectorState::CapabilitiesExchange {
                io_channel_id,
                user_channel_id,
            } => {
                debug!("Capabilities Exchange");

                let send_data_indication_ctx = decode_send_data_indication(input)?;
                let share_control_ctx = decode_share_control(send_data_indication_ctx)?;

                debug!(message = ?share_control_ctx.pdu, "Received");

                if share_control_ctx.channel_id != io_channel_id {
                    warn!(
                        io_channel_id,
                        share_control_ctx.channel_id, "Unexpected channel ID for received Share Control PDU"
                    );
                }

                let ShareControlPdu::ServerDemandActive(server_demand_active) = share_control_ctx.pdu else {
                    return Err(general_err!("unexpected Share Control PDU (expected Server Demand Active)"));
                };

                let capability_sets = server_demand_active.pdu.capability_sets;

                // The server echoes back a desktop size close to the
                // requested one; that negotiated size is authoritative.
                let desktop_size = capability_sets
                    .iter()
                    .find_map(|c| match c {
                        CapabilitySet::Bitmap(b) => Some(DesktopSize {
                            width: b.desktop_width,
                            height: b.desktop_height,
                        }),
                        _ => None,
                    })
                    .unwrap_or(self.config.desktop_size);

                let server_fast_path_input = capability_sets
                    .iter()
                    .find_map(|c| match c {
                        CapabilitySet::Input(input_set) => Some(input_set.input_flags.intersects(
                            capability_sets::InputFlags::FASTPATH_INPUT | capability_sets::InputFlags::FASTPATH_INPUT_2,
                        )),
                        _ => None,
                    })
                    .unwrap_or(false);

                let fast_path_input = self.config.enable_fast_path_input && server_fast_path_input;

                if self.config.enable_fast_path_input && !server_fast_path_input {
                    // Requested but not granted: events fall back to the
                    // slow-path input PDU.
                    info!("Server did not grant fast-path input, falling back to slow-path");
                }

                let capabilities = NegotiatedCapabilities {
                    desktop_size,
                    fast_path_input,
                    pointer_cache_size: POINTER_CACHE_SIZE,
                };

                let client_confirm_active = ShareControlPdu::ClientConfirmActive(create_client_confirm_active(
                    &self.config,
                    capability_sets,
                    desktop_size,
                ));

                debug!(message = ?client_confirm_active, "Send");

                let written = encode_share_control(
                    user_channel_id,
                    io_channel_id,
                    share_control_ctx.share_id,
                    client_confirm_active,
                    output,
                )?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        capabilities,
                        connection_finalization: ConnectionFinalizationSequence::new(
                            io_channel_id,
                            user_channel_id,
                            share_control_ctx.share_id,
                        ),
                    },
                )
            }

            //== Connection Finalization ==//
            // Exchange the synchronize/control/font PDUs; the Font Map PDU
            // makes the connection active.
            ClientConnectorState::ConnectionFinalization {
                io_channel_id,
                user_channel_id,
                capabilities,
                mut connection_finalization,
            } => {
                let written = connection_finalization.step(input, output)?;

                let next_state = if connection_finalization.state.is_terminal() {
                    ClientConnectorState::Connected {
                        result: ConnectionResult {
                            io_channel_id,
                            user_channel_id,
                            share_id: connection_finalization.share_id,
                            capabilities,
                        },
                    }
                } else {
                    ClientConnectorState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        capabilities,
                        connection_finalization,
                    }
                };

                (written, next_state)
            }

            //== Connected ==//
            ClientConnectorState::Connected { .. } => return Err(general_err!("already connected")),
        };

        self.state = next_state;

        Ok(written)
    }
}

fn truncate_cookie(username: &str) -> String {
    // The routing cookie identifier is limited to 9 ANSI characters.
    username.chars().take(9).collect()
}

fn create_gcc_blocks(config: &Config, selected_protocol: nego::SecurityProtocol) -> gcc::ClientGccBlocks {
    use cobaltrdp_pdu::gcc::{
        ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ClientSecurityData, ColorDepth,
        ConnectionType, HighColorDepth, RdpVersion, SecureAccessSequence, SupportedColorDepths,
    };

    let supported_color_depths = match config.color_depth {
        16 => SupportedColorDepths::BPP16,
        24 => SupportedColorDepths::BPP24,
        32 => SupportedColorDepths::BPP32 | SupportedColorDepths::BPP24 | SupportedColorDepths::BPP16,
        // Constrained by Config invariants; anything else is rejected by the client layer.
        _ => SupportedColorDepths::BPP24,
    };

    let mut early_capability_flags = ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE
        | ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU
        | ClientEarlyCapabilityFlags::STRONG_ASYMMETRIC_KEYS;

    if config.color_depth == 32 {
        early_capability_flags |= ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION;
    }

    gcc::ClientGccBlocks {
        core: ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: config.desktop_size.width,
            desktop_height: config.desktop_size.height,
            color_depth: ColorDepth::Bpp8, // ignored in favor of the optional data below
            sec_access_sequence: SecureAccessSequence::Del,
            keyboard_layout: config.keyboard_layout,
            client_build: config.client_build,
            client_name: config.client_name.chars().take(15).collect(),
            keyboard_type: config.keyboard_type,
            keyboard_subtype: config.keyboard_subtype,
            keyboard_functional_keys_count: config.keyboard_functional_keys_count,
            ime_file_name: config.ime_file_name.clone(),
            optional_data: ClientCoreOptionalData {
                post_beta2_color_depth: Some(ColorDepth::Bpp8), // ignored in favor of high_color_depth
                client_product_id: Some(1),
                serial_number: Some(0),
                high_color_depth: Some(HighColorDepth::Bpp24),
                supported_color_depths: Some(supported_color_depths),
                early_capability_flags: Some(early_capability_flags),
                dig_product_id: Some(config.dig_product_id.clone()),
                connection_type: Some(ConnectionType::Lan),
                server_selected_protocol: Some(selected_protocol),
            },
        },
        security: ClientSecurityData::no_security(),
        // No virtual channels beyond the static I/O channel.
        network: None,
    }
}

fn create_client_info_pdu(config: &Config, client_addr: &str) -> ClientInfoPdu {
    let mut flags = ClientInfoFlags::MOUSE
        | ClientInfoFlags::MOUSE_HAS_WHEEL
        | ClientInfoFlags::UNICODE
        | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
        | ClientInfoFlags::LOGON_NOTIFY
        | ClientInfoFlags::LOGON_ERRORS
        | ClientInfoFlags::ENABLE_WINDOWS_KEY
        | ClientInfoFlags::NO_AUDIO_PLAYBACK
        | ClientInfoFlags::MAXIMIZE_SHELL;

    if config.autologon {
        flags |= ClientInfoFlags::AUTOLOGON;
    }

    let mut performance_flags = PerformanceFlags::DISABLE_MENUANIMATIONS | PerformanceFlags::DISABLE_FULLWINDOWDRAG;

    if !config.enable_wallpaper {
        performance_flags |= PerformanceFlags::DISABLE_WALLPAPER;
    }

    let client_info = ClientInfo {
        credentials: InfoCredentials {
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            domain: config.credentials.domain.clone(),
        },
        code_page: 0, // ignored when the keyboard layout is set
        flags,
        compression_type: CompressionType::K8, // ignored without the COMPRESSION flag
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: ExtendedClientInfo {
            address_family: if client_addr.contains(':') {
                AddressFamily::INet6
            } else {
                AddressFamily::INet
            },
            address: client_addr.to_owned(),
            dir: config.client_dir.clone(),
            timezone: TimezoneInfo::default(),
            session_id: 0,
            performance_flags,
        },
    };

    ClientInfoPdu::new(client_info)
}

/// Builds the client Confirm Active capability sets: the server's
/// multi-fragment set is echoed, everything else is this client's fixed
/// advertisement.
fn create_client_confirm_active(
    config: &Config,
    mut server_capability_sets: Vec<CapabilitySet>,
    desktop_size: DesktopSize,
) -> capability_sets::ClientConfirmActive {
    use cobaltrdp_pdu::rdp::capability_sets::{
        Bitmap, BitmapCache, BitmapDrawingFlags, Brush, CacheDefinition, CacheEntry, ClientConfirmActive, DemandActive,
        Font, General, GeneralExtraFlags, GlyphCache, GlyphSupportLevel, Input, InputFlags, LargePointer,
        LargePointerSupportFlags, MultifragmentUpdate, OffscreenBitmapCache, Order, OrderFlags, Pointer, Sound,
        SoundFlags, SupportLevel, VirtualChannel, VirtualChannelFlags,
    };

    server_capability_sets.retain(|capability_set| matches!(capability_set, CapabilitySet::MultiFragmentUpdate(_)));

    let mut input_flags = InputFlags::SCANCODES | InputFlags::UNICODE | InputFlags::MOUSEX;

    if config.enable_fast_path_input {
        input_flags |= InputFlags::FASTPATH_INPUT | InputFlags::FASTPATH_INPUT_2;
    }

    server_capability_sets.extend_from_slice(&[
        CapabilitySet::General(General {
            major_platform_type: config.platform,
            extra_flags: GeneralExtraFlags::FASTPATH_OUTPUT_SUPPORTED | GeneralExtraFlags::NO_BITMAP_COMPRESSION_HDR,
            ..Default::default()
        }),
        CapabilitySet::Bitmap(Bitmap {
            pref_bits_per_pix: config.color_depth as u16,
            desktop_width: desktop_size.width,
            desktop_height: desktop_size.height,
            desktop_resize_flag: false,
            drawing_flags: BitmapDrawingFlags::ALLOW_SKIP_ALPHA,
        }),
        CapabilitySet::Order(Order::new(
            OrderFlags::NEGOTIATE_ORDER_SUPPORT | OrderFlags::ZERO_BOUNDS_DELTAS_SUPPORT,
        )),
        CapabilitySet::BitmapCache(BitmapCache {
            caches: [CacheEntry {
                entries: 0,
                max_cell_size: 0,
            }; capability_sets::BITMAP_CACHE_ENTRIES_NUM],
        }),
        CapabilitySet::Input(Input {
            input_flags,
            keyboard_layout: config.keyboard_layout,
            keyboard_type: Some(config.keyboard_type),
            keyboard_subtype: config.keyboard_subtype,
            keyboard_function_key: config.keyboard_functional_keys_count,
            keyboard_ime_filename: config.ime_file_name.clone(),
        }),
        CapabilitySet::Pointer(Pointer {
            // A non-zero cache size enables client-side pointer rendering.
            color_pointer_cache_size: POINTER_CACHE_SIZE,
            pointer_cache_size: POINTER_CACHE_SIZE,
        }),
        CapabilitySet::Brush(Brush {
            support_level: SupportLevel::Default,
        }),
        CapabilitySet::GlyphCache(GlyphCache {
            glyph_cache: [CacheDefinition {
                entries: 0,
                max_cell_size: 0,
            }; capability_sets::GLYPH_CACHE_NUM],
            frag_cache: CacheDefinition {
                entries: 0,
                max_cell_size: 0,
            },
            glyph_support_level: GlyphSupportLevel::None,
        }),
        CapabilitySet::OffscreenBitmapCache(OffscreenBitmapCache {
            is_supported: false,
            cache_size: 0,
            cache_entries: 0,
        }),
        CapabilitySet::VirtualChannel(VirtualChannel {
            flags: VirtualChannelFlags::NO_COMPRESSION,
            chunk_size: Some(0), // ignored
        }),
        CapabilitySet::Sound(Sound {
            flags: SoundFlags::empty(),
        }),
        CapabilitySet::Font(Font::default()),
        CapabilitySet::LargePointer(LargePointer {
            // UP_TO_384X384_PIXELS lets the server send
            // TS_FP_LARGEPOINTERATTRIBUTE updates; UP_TO_96X96_PIXELS keeps
            // older servers on well-behaved cursors.
            flags: LargePointerSupportFlags::UP_TO_96X96_PIXELS | LargePointerSupportFlags::UP_TO_384X384_PIXELS,
        }),
    ]);

    if !server_capability_sets
        .iter()
        .any(|c| matches!(&c, CapabilitySet::MultiFragmentUpdate(_)))
    {
        server_capability_sets.push(CapabilitySet::MultiFragmentUpdate(MultifragmentUpdate {
            max_request_size: 8 * 1024 * 1024, // 8 MB
        }));
    }

    capability_sets::ClientConfirmActive {
        originator_id: capability_sets::SERVER_CHANNEL_ID,
        pdu: DemandActive {
            source_descriptor: "COBALTRDP".to_owned(),
            capability_sets: server_capability_sets,
        },
    }
}
