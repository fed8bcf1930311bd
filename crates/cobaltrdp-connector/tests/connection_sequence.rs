//! Drives the full connection sequence against synthetic server frames.
//!
//! The TLS upgrade and the CredSSP exchange are transport concerns and are
//! skipped over via their explicit markers, exactly like a real transport
//! driver does.

use cobaltrdp_connector::{
    ClientConnector, ClientConnectorState, Config, Credentials, DesktopSize, Sequence as _, State as _,
};
use cobaltrdp_core::{encode_vec, Encode, WriteBuf};
use cobaltrdp_pdu::gcc::{ConferenceCreateResponse, KeyboardType, RdpVersion};
use cobaltrdp_pdu::mcs;
use cobaltrdp_pdu::nego;
use cobaltrdp_pdu::rdp::capability_sets::{
    Bitmap, BitmapDrawingFlags, CapabilitySet, DemandActive, General, Input, InputFlags, MajorPlatformType,
    ServerDemandActive, SERVER_CHANNEL_ID,
};
use cobaltrdp_pdu::rdp::finalization::{ControlAction, ControlPdu, FontPdu, SynchronizePdu};
use cobaltrdp_pdu::rdp::headers::{
    CompressionFlags, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority,
};
use cobaltrdp_pdu::rdp::license::{LicenseErrorCode, LicensePdu, LicensingErrorMessage};
use cobaltrdp_pdu::x224::{X224, X224Data};

const IO_CHANNEL_ID: u16 = 1003;
const USER_CHANNEL_ID: u16 = 1004;
const SHARE_ID: u32 = 0x0001_000a;

fn test_config() -> Config {
    Config {
        credentials: Credentials {
            username: "automation".to_owned(),
            password: "secret".to_owned(),
            domain: None,
        },
        desktop_size: DesktopSize {
            width: 1920,
            height: 1080,
        },
        color_depth: 24,
        enable_wallpaper: false,
        enable_fast_path_input: true,
        autologon: true,
        client_build: 2600,
        client_name: "cobalt-test".to_owned(),
        client_dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
        keyboard_type: KeyboardType::IbmEnhanced,
        keyboard_subtype: 0,
        keyboard_functional_keys_count: 12,
        keyboard_layout: 0,
        ime_file_name: String::new(),
        dig_product_id: String::new(),
        platform: MajorPlatformType::UNIX,
    }
}

fn x224_frame<T: cobaltrdp_pdu::x224::X224Pdu>(pdu: T) -> Vec<u8> {
    encode_vec(&X224(pdu)).unwrap()
}

fn x224_data_frame<T: Encode>(pdu: &T) -> Vec<u8> {
    let data = encode_vec(pdu).unwrap();
    x224_frame(X224Data { data })
}

fn send_data_indication<T: Encode>(pdu: &T) -> Vec<u8> {
    x224_frame(mcs::SendDataIndication {
        initiator_id: 1002,
        channel_id: IO_CHANNEL_ID,
        user_data: encode_vec(pdu).unwrap(),
    })
}

fn share_data_frame(pdu: ShareDataPdu) -> Vec<u8> {
    send_data_indication(&ShareControlHeader {
        share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
            share_data_pdu: pdu,
            stream_priority: StreamPriority::Medium,
            compression_flags: CompressionFlags::empty(),
        }),
        pdu_source: SERVER_CHANNEL_ID,
        share_id: SHARE_ID,
    })
}

fn connection_confirm_frame() -> Vec<u8> {
    x224_frame(nego::ConnectionConfirm::Response {
        flags: nego::ResponseFlags::empty(),
        protocol: nego::SecurityProtocol::HYBRID,
    })
}

fn connect_response_frame() -> Vec<u8> {
    use cobaltrdp_pdu::gcc::{ServerCoreData, ServerGccBlocks, ServerNetworkData, ServerSecurityData};

    let response = mcs::ConnectResponse {
        conference_create_response: ConferenceCreateResponse {
            user_id: 1002,
            gcc_blocks: ServerGccBlocks {
                core: ServerCoreData {
                    version: RdpVersion::V5_PLUS,
                    client_requested_protocols: Some(nego::SecurityProtocol::HYBRID),
                    early_capability_flags: Some(0),
                },
                network: ServerNetworkData {
                    channel_ids: Vec::new(),
                    io_channel: IO_CHANNEL_ID,
                },
                security: ServerSecurityData::no_security(),
            },
        },
        called_connect_id: 0,
        domain_parameters: mcs::DomainParameters::target(),
    };

    x224_data_frame(&response)
}

fn attach_user_confirm_frame() -> Vec<u8> {
    x224_frame(mcs::AttachUserConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
    })
}

fn channel_join_confirm_frame(channel_id: u16) -> Vec<u8> {
    x224_frame(mcs::ChannelJoinConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
        requested_channel_id: channel_id,
        channel_id,
    })
}

fn license_frame() -> Vec<u8> {
    send_data_indication(&LicensePdu::ErrorMessage(LicensingErrorMessage {
        error_code: LicenseErrorCode::StatusValidClient,
        state_transition: 2, // ST_NO_TRANSITION
        error_info: Vec::new(),
    }))
}

fn demand_active_frame() -> Vec<u8> {
    send_data_indication(&ShareControlHeader {
        share_control_pdu: ShareControlPdu::ServerDemandActive(ServerDemandActive {
            pdu: DemandActive {
                source_descriptor: "RDP".to_owned(),
                capability_sets: vec![
                    CapabilitySet::General(General::default()),
                    CapabilitySet::Bitmap(Bitmap {
                        pref_bits_per_pix: 24,
                        desktop_width: 1920,
                        desktop_height: 1080,
                        desktop_resize_flag: false,
                        drawing_flags: BitmapDrawingFlags::ALLOW_SKIP_ALPHA,
                    }),
                    CapabilitySet::Input(Input {
                        input_flags: InputFlags::SCANCODES | InputFlags::FASTPATH_INPUT | InputFlags::FASTPATH_INPUT_2,
                        keyboard_layout: 0,
                        keyboard_type: None,
                        keyboard_subtype: 0,
                        keyboard_function_key: 0,
                        keyboard_ime_filename: String::new(),
                    }),
                ],
            },
        }),
        pdu_source: SERVER_CHANNEL_ID,
        share_id: SHARE_ID,
    })
}

fn finalization_frames() -> Vec<Vec<u8>> {
    vec![
        share_data_frame(ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1002 })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::Cooperate,
            grant_id: 0,
            control_id: 0,
        })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::GrantedControl,
            grant_id: USER_CHANNEL_ID,
            control_id: u32::from(SERVER_CHANNEL_ID),
        })),
        share_data_frame(ShareDataPdu::FontMap(FontPdu::default())),
    ]
}

#[test]
fn full_connection_sequence_reaches_connected() {
    let mut server_frames: std::collections::VecDeque<Vec<u8>> = std::collections::VecDeque::new();
    server_frames.push_back(connection_confirm_frame());
    server_frames.push_back(connect_response_frame());
    server_frames.push_back(attach_user_confirm_frame());
    server_frames.push_back(channel_join_confirm_frame(IO_CHANNEL_ID));
    server_frames.push_back(channel_join_confirm_frame(USER_CHANNEL_ID));
    server_frames.push_back(license_frame());
    server_frames.push_back(demand_active_frame());
    for frame in finalization_frames() {
        server_frames.push_back(frame);
    }

    let mut connector = ClientConnector::new(test_config(), "10.0.0.2".to_owned());
    let mut buf = WriteBuf::new();

    let mut reached_nla = false;

    for _ in 0..64 {
        if connector.state.is_terminal() {
            break;
        }

        if connector.should_perform_security_upgrade() {
            connector.mark_security_upgrade_as_done().unwrap();
            continue;
        }

        if connector.should_perform_credssp() {
            // No I/O channel PDU has been transmitted before NLA: the only
            // client frame so far is the X.224 connection request.
            reached_nla = true;
            connector.mark_credssp_as_done().unwrap();
            continue;
        }

        buf.clear();

        if connector.next_pdu_hint().is_some() {
            let frame = server_frames.pop_front().expect("connector wants more server frames");
            connector.step(&frame, &mut buf).unwrap();
        } else {
            connector.step_no_input(&mut buf).unwrap();
        }
    }

    assert!(reached_nla);
    assert!(server_frames.is_empty(), "all server frames consumed");

    let state_name = connector.state().name();
    let ClientConnectorState::Connected { result } = connector.state else {
        panic!("connector did not reach the Connected state: {state_name}");
    };

    assert_eq!(result.io_channel_id, IO_CHANNEL_ID);
    assert_eq!(result.user_channel_id, USER_CHANNEL_ID);
    assert_eq!(result.share_id, SHARE_ID);
    assert!(result.capabilities.fast_path_input);
    assert_eq!(result.capabilities.desktop_size.width, 1920);
    assert_eq!(result.capabilities.desktop_size.height, 1080);
    assert_eq!(result.capabilities.pointer_cache_size, 25);
}

#[test]
fn negotiation_failure_surfaces_the_code() {
    let mut connector = ClientConnector::new(test_config(), "10.0.0.2".to_owned());
    let mut buf = WriteBuf::new();

    connector.step_no_input(&mut buf).unwrap();

    let failure = x224_frame(nego::ConnectionConfirm::Failure {
        code: nego::FailureCode::HYBRID_REQUIRED_BY_SERVER,
    });

    buf.clear();
    let e = connector.step(&failure, &mut buf).err().unwrap();
    assert!(e.to_string().contains("negotiation failure"));
}

#[test]
fn license_error_other_than_valid_client_is_fatal() {
    let mut server_frames: std::collections::VecDeque<Vec<u8>> = std::collections::VecDeque::new();
    server_frames.push_back(connection_confirm_frame());
    server_frames.push_back(connect_response_frame());
    server_frames.push_back(attach_user_confirm_frame());
    server_frames.push_back(channel_join_confirm_frame(IO_CHANNEL_ID));
    server_frames.push_back(channel_join_confirm_frame(USER_CHANNEL_ID));
    server_frames.push_back(send_data_indication(&LicensePdu::ErrorMessage(LicensingErrorMessage {
        error_code: LicenseErrorCode::NoLicense,
        state_transition: 2,
        error_info: Vec::new(),
    })));

    let mut connector = ClientConnector::new(test_config(), "10.0.0.2".to_owned());
    let mut buf = WriteBuf::new();

    let error = loop {
        if connector.should_perform_security_upgrade() {
            connector.mark_security_upgrade_as_done().unwrap();
            continue;
        }
        if connector.should_perform_credssp() {
            connector.mark_credssp_as_done().unwrap();
            continue;
        }

        buf.clear();

        let result = if connector.next_pdu_hint().is_some() {
            let frame = server_frames.pop_front().expect("ran out of server frames");
            connector.step(&frame, &mut buf)
        } else {
            connector.step_no_input(&mut buf)
        };

        match result {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };

    assert!(error.to_string().contains("license error"));
}
