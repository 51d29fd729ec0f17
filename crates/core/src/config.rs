//! Gemeinsamer Konfigurations-Lader
//!
//! Jede Komponente (SE, IAP, OAP, Transcriber, Reasoner, Synthesizer) laedt
//! ihre eigene, stark typisierte Config-Struktur aus einer TOML-Datei mit
//! `#[serde(default)]`, damit der Prozess auch ganz ohne Datei lauffaehig
//! ist. Dieser Helfer buendelt das gemeinsame Lade-/Fallback-Verhalten,
//! damit es nicht sechsmal dupliziert wird.
//!
//! Praezedenz (hoechste zuerst): CLI-Flag > Wert aus dem persistenten
//! Key/Value-Store > Wert aus der TOML-Datei > eingebauter Standard. Die
//! ersten beiden Stufen setzen die Komponenten-Binaries selbst um (nach
//! dem Laden hier), da sie je nach Feld unterschiedliche Flags kennen.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Laedt eine Konfigurationsstruktur aus einer TOML-Datei.
///
/// Fehlt die Datei, wird `T::default()` zurueckgegeben und eine Warnung
/// geloggt. Ein Lesefehler (Rechte, Pfad ungueltig) oder ein TOML-
/// Parsefehler ist dagegen fatal fuer den Aufrufer.
pub fn load_toml_config<T>(pfad: &str) -> Result<T>
where
    T: Default + DeserializeOwned,
{
    match std::fs::read_to_string(pfad) {
        Ok(inhalt) => {
            toml::from_str(&inhalt).with_context(|| format!("Konfigurationsfehler in '{pfad}'"))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(pfad, "Konfigurationsdatei nicht gefunden, verwende Standardwerte");
            Ok(T::default())
        }
        Err(e) => Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar")),
    }
}

/// Liest den Pfad zur Konfigurationsdatei aus einer Umgebungsvariable,
/// mit Fallback auf `config.toml`.
pub fn config_pfad_aus_env(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| "config.toml".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Beispiel {
        port: u16,
        name: String,
    }

    #[test]
    fn fehlende_datei_liefert_default() {
        let cfg: Beispiel = load_toml_config("/nicht/vorhanden/config.toml").unwrap();
        assert_eq!(cfg, Beispiel::default());
    }

    #[test]
    fn env_fallback_ohne_var() {
        std::env::remove_var("TELEFONKERN_TEST_CONFIG_PFAD_X");
        assert_eq!(
            config_pfad_aus_env("TELEFONKERN_TEST_CONFIG_PFAD_X"),
            "config.toml"
        );
    }

    #[test]
    fn env_fallback_mit_var() {
        std::env::set_var("TELEFONKERN_TEST_CONFIG_PFAD_Y", "/tmp/x.toml");
        assert_eq!(
            config_pfad_aus_env("TELEFONKERN_TEST_CONFIG_PFAD_Y"),
            "/tmp/x.toml"
        );
        std::env::remove_var("TELEFONKERN_TEST_CONFIG_PFAD_Y");
    }
}
