// src/common/retry.rs

use crate::common::error::AppError;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Ejecuta `op` y la reintenta con backoff exponencial mientras falle con un
/// error transitorio (contención de bloqueos en la base).
///
/// Hasta `max_retries` reintentos además del intento inicial; la espera del
/// reintento n es `base_delay * 2^n`. Cualquier error no transitorio se
/// propaga de inmediato: las violaciones de reglas de negocio son
/// deterministas y reintentarlas no cambia nada.
///
/// No es un circuit breaker: sin jitter y sin tope de espera.
pub async fn with_retry<T, F, Fut>(
    op_name: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = base_delay * 2u32.pow(attempt);
                tracing::warn!(
                    "{op_name}: contención de bloqueo (intento {}/{}), reintentando en {:?}",
                    attempt + 1,
                    max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn reintenta_errores_transitorios_y_luego_triunfa() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", 3, Duration::from_millis(200), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::LockContention)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn agota_la_cuota_y_devuelve_el_ultimo_error() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> = with_retry("test", 3, Duration::from_millis(200), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::LockContention) }
        })
        .await;
        assert!(matches!(result, Err(AppError::LockContention)));
        // 1 intento inicial + 3 reintentos
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Esperas: 200 + 400 + 800 = 1400ms (el tiempo pausado avanza solo)
        assert!(start.elapsed() >= Duration::from_millis(1400));
    }

    #[tokio::test(start_paused = true)]
    async fn los_errores_de_negocio_no_se_reintentan() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test", 3, Duration::from_millis(200), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::InsufficientStock { disponible: 0, solicitado: 1 })
            }
        })
        .await;
        assert!(matches!(result, Err(AppError::InsufficientStock { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
