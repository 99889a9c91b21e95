//! Parser for recorded Master event logs, one event per line:
//!
//! ```text
//! +STATUS:Connected
//! +INFO:"2.1.0","A1B2C3"
//! +RX:3
//! +TX:65280
//! +MEAS:1000,45,17,1=1234.5;2=0;3=2210.25
//! ```
//!
//! A `+MEAS` line is transmitter address, RSSI, sequence number, then
//! `receiver=distance_mm` pairs separated by `;`.

use crate::master::{MasterEvent, MasterStatus, Measurement, RxMeasurement, UnitAddress};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, u16, u32, u8},
    combinator::{all_consuming, map, value},
    error::Error,
    multi::separated_list0,
    number::complete::double,
    sequence::{delimited, preceded, separated_pair, tuple},
    Finish, IResult,
};

use std::str::FromStr;

fn parse_address(s: &str) -> IResult<&str, UnitAddress> {
    map(u16, UnitAddress)(s)
}

fn parse_quoted(s: &str) -> IResult<&str, String> {
    map(
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        |cs: &str| cs.to_owned(),
    )(s)
}

fn parse_status(s: &str) -> IResult<&str, MasterEvent> {
    map(
        preceded(
            tag("+STATUS:"),
            alt((
                value(MasterStatus::Offline, tag("Offline")),
                value(MasterStatus::Connecting, tag("Connecting")),
                value(MasterStatus::Connected, tag("Connected")),
            )),
        ),
        MasterEvent::StatusChanged,
    )(s)
}

fn parse_info(s: &str) -> IResult<&str, MasterEvent> {
    map(
        preceded(
            tag("+INFO:"),
            separated_pair(parse_quoted, char(','), parse_quoted),
        ),
        |(version, serial)| MasterEvent::InfoReceived { version, serial },
    )(s)
}

fn parse_unit(s: &str) -> IResult<&str, MasterEvent> {
    alt((
        map(
            preceded(tag("+TX:"), parse_address),
            MasterEvent::NewTransmitterConnected,
        ),
        map(
            preceded(tag("+RX:"), parse_address),
            MasterEvent::NewReceiverConnected,
        ),
    ))(s)
}

fn parse_rx_measurement(s: &str) -> IResult<&str, RxMeasurement> {
    map(
        separated_pair(parse_address, char('='), double),
        |(receiver, distance_mm)| RxMeasurement {
            receiver,
            distance_mm,
        },
    )(s)
}

fn parse_measurement(s: &str) -> IResult<&str, MasterEvent> {
    map(
        tuple((
            preceded(tag("+MEAS:"), parse_address),
            preceded(tag(","), u8),
            preceded(tag(","), u32),
            preceded(tag(","), separated_list0(char(';'), parse_rx_measurement)),
        )),
        |(tx_address, rssi, sequence, rx_measurements)| {
            MasterEvent::MeasurementReceived(Measurement {
                tx_address,
                rssi,
                sequence,
                rx_measurements,
            })
        },
    )(s)
}

fn parse_event(s: &str) -> IResult<&str, MasterEvent> {
    alt((parse_status, parse_info, parse_unit, parse_measurement))(s)
}

impl FromStr for MasterEvent {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(parse_event)(s.trim_end()).finish() {
            Ok((_remaining, event)) => Ok(event),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}
